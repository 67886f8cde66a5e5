//! Error types for the sync engine.

use notesync_core::CoreError;
use std::io;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The cloud storage could not be reached or refused the request.
    #[error("cloud storage unavailable: {message}")]
    RemoteUnavailable {
        /// Error message.
        message: String,
    },

    /// The cloud storage needs the user to (re)authorize access.
    #[error("cloud storage requires authorization")]
    AuthorizationRequired,

    /// The cloud repository could not be decrypted with any known transfer code.
    #[error("cloud repository could not be decrypted")]
    DecryptionFailed,

    /// Another synchronization is running or awaiting its continuation.
    #[error("a synchronization is already in progress")]
    ConcurrentSyncRejected,

    /// The entered transfer code is malformed.
    #[error("invalid transfer code")]
    InvalidTransferCode,

    /// Local repository or settings error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Creates a remote unavailable error.
    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    /// Returns true if trying again later may succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::RemoteUnavailable { .. })
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Core(CoreError::from(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Core(CoreError::from(err))
    }
}

/// Errors reported by a [`CloudStorage`](crate::CloudStorage) client.
#[derive(Error, Debug)]
pub enum CloudStorageError {
    /// No repository is stored at the cloud location.
    #[error("no repository found in cloud storage")]
    NotFound,

    /// The service could not be reached or rejected the request.
    #[error("cloud storage unavailable: {0}")]
    Unavailable(String),

    /// Credentials are missing, expired or rejected.
    #[error("cloud storage requires authorization")]
    AuthorizationRequired,

    /// Local I/O error while talking to the cloud location.
    #[error("cloud storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for cloud storage calls.
pub type CloudResult<T> = Result<T, CloudStorageError>;

impl From<CloudStorageError> for SyncError {
    fn from(err: CloudStorageError) -> Self {
        match err {
            CloudStorageError::AuthorizationRequired => SyncError::AuthorizationRequired,
            CloudStorageError::NotFound => SyncError::remote_unavailable("repository disappeared"),
            CloudStorageError::Unavailable(message) => SyncError::RemoteUnavailable { message },
            CloudStorageError::Io(err) => SyncError::remote_unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(SyncError::remote_unavailable("connection lost").is_transient());
        assert!(!SyncError::DecryptionFailed.is_transient());
    }

    #[test]
    fn cloud_errors_map_to_sync_errors() {
        assert!(matches!(
            SyncError::from(CloudStorageError::AuthorizationRequired),
            SyncError::AuthorizationRequired
        ));
        assert!(SyncError::from(CloudStorageError::Unavailable("503".into())).is_transient());
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(SyncError::from(CloudStorageError::Io(io)).is_transient());
    }

    #[test]
    fn error_display() {
        let err = SyncError::ConcurrentSyncRejected;
        assert_eq!(err.to_string(), "a synchronization is already in progress");

        let err = SyncError::from(CoreError::invalid_repository("truncated"));
        assert!(err.to_string().contains("truncated"));
    }
}
