//! Cloud storage abstraction.
//!
//! The cloud location has no logic of its own: it stores one opaque blob,
//! the encrypted repository, which can be uploaded, downloaded and deleted.
//! Concrete provider clients (FTP, WebDAV, OAuth based services) live
//! outside this crate and plug in through [`CloudStorage`].

use crate::error::{CloudResult, CloudStorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Name of the blob stored at the cloud location.
pub const CLOUD_FILE_NAME: &str = "notesync_repository.nsc";

/// Provider id of [`FolderCloudStorage`].
pub const FOLDER_PROVIDER: &str = "folder";

/// Where and as whom to reach a cloud storage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredentials {
    /// Provider id, selects the client.
    pub provider: String,
    /// Provider specific location: a URL, a directory, a bucket.
    pub location: String,
    /// User name, if the provider needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password or access token, if the provider needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl CloudCredentials {
    /// Creates credentials without user name or secret.
    pub fn new(provider: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            location: location.into(),
            username: None,
            secret: None,
        }
    }

    /// Credentials for a folder acting as the cloud location.
    pub fn folder(path: impl Into<PathBuf>) -> Self {
        Self::new(FOLDER_PROVIDER, path.into().to_string_lossy().into_owned())
    }

    /// Sets the secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("provider", &self.provider)
            .field("location", &self.location)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A client of one cloud storage provider.
///
/// Implementations are blocking; the sync service runs them on a worker
/// thread.
pub trait CloudStorage: Send + Sync {
    /// Stores `data`, replacing any previous blob.
    fn upload(&self, credentials: &CloudCredentials, data: &[u8]) -> CloudResult<()>;

    /// Fetches the stored blob.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing was uploaded yet.
    fn download(&self, credentials: &CloudCredentials) -> CloudResult<Vec<u8>>;

    /// Removes the stored blob. Removing a missing blob is not an error.
    fn delete(&self, credentials: &CloudCredentials) -> CloudResult<()>;

    /// Returns true if a blob is stored.
    fn exists(&self, credentials: &CloudCredentials) -> CloudResult<bool> {
        match self.download(credentials) {
            Ok(_) => Ok(true),
            Err(CloudStorageError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Builds cloud storage clients for credentials.
pub trait CloudStorageFactory: Send + Sync {
    /// Provider ids the user can choose from.
    fn providers(&self) -> Vec<String>;

    /// Returns a client for the provider named in `credentials`.
    fn create(&self, credentials: &CloudCredentials) -> CloudResult<Arc<dyn CloudStorage>>;
}

/// Factory over a fixed set of provider clients.
#[derive(Clone, Default)]
pub struct CloudStorageRegistry {
    providers: Vec<(String, Arc<dyn CloudStorage>)>,
}

impl CloudStorageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client under a provider id.
    pub fn with_provider(
        mut self,
        provider: impl Into<String>,
        storage: Arc<dyn CloudStorage>,
    ) -> Self {
        self.providers.push((provider.into(), storage));
        self
    }
}

impl CloudStorageFactory for CloudStorageRegistry {
    fn providers(&self) -> Vec<String> {
        self.providers.iter().map(|(id, _)| id.clone()).collect()
    }

    fn create(&self, credentials: &CloudCredentials) -> CloudResult<Arc<dyn CloudStorage>> {
        self.providers
            .iter()
            .find(|(id, _)| *id == credentials.provider)
            .map(|(_, storage)| Arc::clone(storage))
            .ok_or_else(|| {
                CloudStorageError::Unavailable(format!(
                    "unknown cloud provider '{}'",
                    credentials.provider
                ))
            })
    }
}

impl fmt::Debug for CloudStorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudStorageRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

/// A local directory used as the cloud location.
///
/// Pointing it at a folder synchronized by a desktop client (or a network
/// share) gives a working setup without any provider SDK.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderCloudStorage;

impl FolderCloudStorage {
    /// Creates the client.
    pub fn new() -> Self {
        Self
    }

    fn blob_path(credentials: &CloudCredentials) -> CloudResult<PathBuf> {
        let dir = PathBuf::from(&credentials.location);
        if !dir.is_dir() {
            return Err(CloudStorageError::Unavailable(format!(
                "folder {} does not exist",
                dir.display()
            )));
        }
        Ok(dir.join(CLOUD_FILE_NAME))
    }
}

impl CloudStorage for FolderCloudStorage {
    fn upload(&self, credentials: &CloudCredentials, data: &[u8]) -> CloudResult<()> {
        let path = Self::blob_path(credentials)?;
        let temp_path = path.with_extension("nsc.tmp");

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &path)?;

        debug!(path = %path.display(), bytes = data.len(), "uploaded to folder");
        Ok(())
    }

    fn download(&self, credentials: &CloudCredentials) -> CloudResult<Vec<u8>> {
        let path = Self::blob_path(credentials)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CloudStorageError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, credentials: &CloudCredentials) -> CloudResult<()> {
        let path = Self::blob_path(credentials)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, credentials: &CloudCredentials) -> CloudResult<bool> {
        Ok(Self::blob_path(credentials)?.is_file())
    }
}

/// In-memory cloud storage for tests.
///
/// Blobs are keyed by location. Failures can be switched on to exercise
/// the error paths of the sync chain.
#[derive(Debug, Default)]
pub struct MemoryCloudStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    authorization_required: AtomicBool,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
}

impl MemoryCloudStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes every call fail with `AuthorizationRequired`.
    pub fn set_authorization_required(&self, required: bool) {
        self.authorization_required.store(required, Ordering::SeqCst);
    }

    /// Returns the blob stored at a location.
    pub fn blob(&self, location: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(location).cloned()
    }

    /// Stores a blob directly, bypassing failure switches and counters.
    pub fn put_blob(&self, location: &str, data: Vec<u8>) {
        self.blobs.lock().insert(location.to_string(), data);
    }

    /// Returns the number of successful uploads.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Returns the number of successful downloads.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn check(&self) -> CloudResult<()> {
        if self.authorization_required.load(Ordering::SeqCst) {
            return Err(CloudStorageError::AuthorizationRequired);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CloudStorageError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}

impl CloudStorage for MemoryCloudStorage {
    fn upload(&self, credentials: &CloudCredentials, data: &[u8]) -> CloudResult<()> {
        self.check()?;
        self.blobs
            .lock()
            .insert(credentials.location.clone(), data.to_vec());
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn download(&self, credentials: &CloudCredentials) -> CloudResult<Vec<u8>> {
        self.check()?;
        let data = self
            .blobs
            .lock()
            .get(&credentials.location)
            .cloned()
            .ok_or(CloudStorageError::NotFound)?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    fn delete(&self, credentials: &CloudCredentials) -> CloudResult<()> {
        self.check()?;
        self.blobs.lock().remove(&credentials.location);
        Ok(())
    }
}
