//! Error types for NoteSync core.

use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in NoteSync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Local storage could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] io::Error),

    /// The repository document is corrupt or cannot be interpreted.
    ///
    /// A document in this state is preserved for manual recovery and is
    /// never replaced by a fresh repository.
    #[error("invalid repository: {message}")]
    InvalidRepository {
        /// Description of the problem.
        message: String,
    },

    /// The repository was written by a newer version of the engine.
    #[error("unsupported repository revision {revision}, newest supported is {supported}")]
    UnsupportedRevision {
        /// Revision found in the document.
        revision: u32,
        /// Newest revision this engine understands.
        supported: u32,
    },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed (wrong key or corrupted ciphertext).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The safe required for an operation is not open.
    #[error("safe {safe_id} is not open")]
    SafeNotOpen {
        /// The safe that must be opened first.
        safe_id: Uuid,
    },

    /// The repository file is locked by another writer.
    #[error("repository locked: another process is writing")]
    RepositoryLocked,
}

impl CoreError {
    /// Creates an invalid repository error.
    pub fn invalid_repository(message: impl Into<String>) -> Self {
        Self::InvalidRepository {
            message: message.into(),
        }
    }

    /// Creates an unsupported revision error.
    pub fn unsupported_revision(revision: u32, supported: u32) -> Self {
        Self::UnsupportedRevision {
            revision,
            supported,
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Returns true if the error should be treated as corrupt local data.
    pub fn is_invalid_repository(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidRepository { .. } | CoreError::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::unsupported_revision(9, 2);
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('2'));

        let err = CoreError::invalid_key_size(12, 32);
        assert_eq!(
            err.to_string(),
            "invalid key size: expected 32 bytes, got 12"
        );
    }

    #[test]
    fn invalid_repository_classification() {
        assert!(CoreError::invalid_repository("truncated").is_invalid_repository());
        assert!(!CoreError::decryption_failed("tag mismatch").is_invalid_repository());
    }
}
