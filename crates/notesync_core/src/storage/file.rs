//! File backed repository storage.
//!
//! Layout inside the data directory:
//!
//! ```text
//! <data_dir>/
//! ├─ notesync_repository.json        # the repository document
//! ├─ notesync_repository.json.new    # after-write shadow (only during a save)
//! ├─ notesync_repository.json.old    # before-write shadow (only during a save)
//! └─ notesync_repository.json.lock   # advisory lock for single-writer
//! ```
//!
//! A save writes and syncs the after-write shadow, moves the current file
//! to the before-write shadow, then renames the new file into place. A
//! process killed at any point leaves at least one complete copy behind,
//! which [`FileRepositoryStorage::reload`] promotes when the primary file
//! is missing or unreadable.

use super::document::{decode_document, encode_document};
use super::updater::{DefaultRepositoryUpdater, RepositoryUpdater};
use super::{LoadOutcome, RepositoryStorage, ShadowKind};
use crate::error::{CoreError, CoreResult};
use crate::model::Repository;
use crate::types::now;
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Smallest size a shadow file must have to be considered for recovery.
pub const MIN_PLAUSIBLE_SIZE: u64 = 64;

/// Selects the document file name, keeping development builds apart from
/// the production data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageProfile {
    /// Regular installation.
    #[default]
    Production,
    /// Development build.
    Development,
}

impl StorageProfile {
    /// Returns the document file name for this profile.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            StorageProfile::Production => "notesync_repository.json",
            StorageProfile::Development => "notesync_repository_dev.json",
        }
    }
}

/// Stores the repository as a JSON document in a directory.
pub struct FileRepositoryStorage {
    dir: PathBuf,
    profile: StorageProfile,
    updater: Box<dyn RepositoryUpdater>,
    cache: RwLock<Option<Repository>>,
}

impl FileRepositoryStorage {
    /// Creates a storage in `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>, profile: StorageProfile) -> Self {
        Self {
            dir: dir.into(),
            profile,
            updater: Box::new(DefaultRepositoryUpdater),
            cache: RwLock::new(None),
        }
    }

    /// Replaces the document updater.
    #[must_use]
    pub fn with_updater(mut self, updater: Box<dyn RepositoryUpdater>) -> Self {
        self.updater = updater;
        self
    }

    /// Returns the data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the repository document.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(self.profile.file_name())
    }

    /// Returns the path of a shadow file.
    #[must_use]
    pub fn shadow_path(&self, kind: ShadowKind) -> PathBuf {
        let suffix = match kind {
            ShadowKind::BeforeWrite => "old",
            ShadowKind::AfterWrite => "new",
        };
        self.dir
            .join(format!("{}.{suffix}", self.profile.file_name()))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.profile.file_name()))
    }

    /// Looks for a usable shadow file and promotes it to the primary file.
    ///
    /// The after-write shadow is newer and is tried first. An unreadable
    /// primary file is kept aside as `<file>.corrupt-<time>` instead of
    /// being overwritten.
    fn recover(&self) -> CoreResult<Option<(Repository, ShadowKind)>> {
        for kind in [ShadowKind::AfterWrite, ShadowKind::BeforeWrite] {
            let shadow = self.shadow_path(kind);
            let Ok(metadata) = fs::metadata(&shadow) else {
                continue;
            };
            if metadata.len() < MIN_PLAUSIBLE_SIZE {
                debug!(path = %shadow.display(), size = metadata.len(), "shadow file too small");
                continue;
            }

            let bytes = fs::read(&shadow)?;
            match decode_document(&bytes, self.updater.as_ref()) {
                Ok(decoded) => {
                    let primary = self.path();
                    if primary.exists() {
                        let corrupt = self.corrupt_path();
                        fs::rename(&primary, &corrupt)?;
                        warn!(path = %corrupt.display(), "kept unreadable repository file");
                    }
                    fs::rename(&shadow, &primary)?;
                    sync_directory(&self.dir)?;
                    warn!(path = %shadow.display(), ?kind, "recovered repository from shadow file");
                    return Ok(Some((decoded.repository, kind)));
                }
                Err(err) => {
                    debug!(path = %shadow.display(), error = %err, "shadow file unusable");
                }
            }
        }
        Ok(None)
    }

    /// A name no earlier recovery has used.
    fn corrupt_path(&self) -> PathBuf {
        let base = format!(
            "{}.corrupt-{}",
            self.profile.file_name(),
            now().format("%Y%m%dT%H%M%S%3f")
        );
        let mut candidate = self.dir.join(&base);
        let mut counter = 1;
        while candidate.exists() {
            candidate = self.dir.join(format!("{base}-{counter}"));
            counter += 1;
        }
        candidate
    }

    fn has_shadow(&self) -> bool {
        self.shadow_path(ShadowKind::AfterWrite).exists()
            || self.shadow_path(ShadowKind::BeforeWrite).exists()
    }

    fn write_document(&self, repository: &Repository) -> CoreResult<()> {
        let data = encode_document(repository)?;
        fs::create_dir_all(&self.dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::RepositoryLocked);
        }

        let primary = self.path();
        let after_write = self.shadow_path(ShadowKind::AfterWrite);
        let before_write = self.shadow_path(ShadowKind::BeforeWrite);

        let mut file = File::create(&after_write)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        if primary.exists() {
            fs::rename(&primary, &before_write)?;
        }
        fs::rename(&after_write, &primary)?;
        match fs::remove_file(&before_write) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        sync_directory(&self.dir)?;

        // Dropping the handle releases the lock.
        drop(lock_file);
        Ok(())
    }
}

impl RepositoryStorage for FileRepositoryStorage {
    fn reload(&self) -> CoreResult<(Repository, LoadOutcome)> {
        let primary = self.path();

        let result = if primary.exists() {
            let bytes = fs::read(&primary)?;
            match decode_document(&bytes, self.updater.as_ref()) {
                Ok(decoded) if decoded.upgraded => {
                    // Persist right away so the upgrade runs once.
                    self.write_document(&decoded.repository)?;
                    (decoded.repository, LoadOutcome::Upgraded)
                }
                Ok(decoded) => (decoded.repository, LoadOutcome::Loaded),
                Err(err) if err.is_invalid_repository() => {
                    warn!(path = %primary.display(), error = %err, "repository document is invalid");
                    match self.recover()? {
                        Some((repository, kind)) => (repository, LoadOutcome::Recovered(kind)),
                        None => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        } else if self.has_shadow() {
            match self.recover()? {
                Some((repository, kind)) => (repository, LoadOutcome::Recovered(kind)),
                None => {
                    return Err(CoreError::invalid_repository(
                        "repository file missing and no usable shadow file",
                    ))
                }
            }
        } else {
            let repository = Repository::with_sample_notes();
            self.write_document(&repository)?;
            info!(path = %primary.display(), "created new repository");
            (repository, LoadOutcome::Created)
        };

        *self.cache.write() = Some(result.0.clone());
        Ok(result)
    }

    fn save(&self, repository: &Repository) -> CoreResult<()> {
        self.write_document(repository)?;
        *self.cache.write() = Some(repository.clone());
        debug!(path = %self.path().display(), notes = repository.notes.len(), "saved repository");
        Ok(())
    }

    fn cached(&self) -> Option<Repository> {
        self.cache.read().clone()
    }

    fn clear_cache(&self) {
        *self.cache.write() = None;
    }
}

impl std::fmt::Debug for FileRepositoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepositoryStorage")
            .field("dir", &self.dir)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Syncs a directory so renames inside it are durable.
#[cfg(unix)]
fn sync_directory(dir: &Path) -> CoreResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> CoreResult<()> {
    // NTFS journaling covers metadata durability.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Note;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> FileRepositoryStorage {
        FileRepositoryStorage::new(dir.path(), StorageProfile::Production)
    }

    fn corrupt_files(dir: &TempDir) -> Vec<PathBuf> {
        fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("notesync_repository.json.corrupt"))
            })
            .collect()
    }

    #[test]
    fn missing_file_creates_sample_repository() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let (repository, outcome) = storage.reload().unwrap();
        assert_eq!(outcome, LoadOutcome::Created);
        assert!(!repository.notes.is_empty());
        assert!(storage.path().exists());
    }

    #[test]
    fn save_then_reload() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let mut repository = Repository::new();
        repository.notes.push(Note::new());
        storage.save(&repository).unwrap();
        assert!(!storage.shadow_path(ShadowKind::AfterWrite).exists());
        assert!(!storage.shadow_path(ShadowKind::BeforeWrite).exists());

        let fresh = FileRepositoryStorage::new(dir.path(), StorageProfile::Production);
        let (loaded, outcome) = fresh.reload().unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(loaded, repository);
    }

    #[test]
    fn profiles_use_different_files() {
        let dir = TempDir::new().unwrap();
        let production = FileRepositoryStorage::new(dir.path(), StorageProfile::Production);
        let development = FileRepositoryStorage::new(dir.path(), StorageProfile::Development);
        assert_ne!(production.path(), development.path());

        production.save(&Repository::new()).unwrap();
        assert!(!development.path().exists());
    }

    #[test]
    fn load_uses_cache() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let repository = Repository::new();
        storage.save(&repository).unwrap();

        // The cached instance survives a change behind the storage's back.
        fs::write(storage.path(), b"garbage").unwrap();
        assert_eq!(storage.load().unwrap(), repository);

        storage.clear_cache();
        assert!(storage.load().is_err());
    }

    #[test]
    fn corrupt_file_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        fs::write(storage.path(), b"{ this is not a repository").unwrap();

        let err = storage.reload().unwrap_err();
        assert!(err.is_invalid_repository());
        assert_eq!(
            fs::read(storage.path()).unwrap(),
            b"{ this is not a repository"
        );
    }

    #[test]
    fn truncated_file_recovers_from_before_write_shadow() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let repository = Repository::with_sample_notes();
        storage.save(&repository).unwrap();

        let good = fs::read(storage.path()).unwrap();
        fs::write(storage.shadow_path(ShadowKind::BeforeWrite), &good).unwrap();
        fs::write(storage.path(), &good[..good.len() / 2]).unwrap();

        let (recovered, outcome) = storage.reload().unwrap();
        assert_eq!(outcome, LoadOutcome::Recovered(ShadowKind::BeforeWrite));
        assert_eq!(recovered, repository);
        assert_eq!(corrupt_files(&dir).len(), 1);
        assert_eq!(fs::read(storage.path()).unwrap(), good);
    }

    #[test]
    fn repeated_recoveries_keep_every_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.save(&Repository::with_sample_notes()).unwrap();
        let good = fs::read(storage.path()).unwrap();

        for garbage in [&b"first broken write"[..], &b"second broken write"[..]] {
            fs::write(storage.shadow_path(ShadowKind::BeforeWrite), &good).unwrap();
            fs::write(storage.path(), garbage).unwrap();
            storage.clear_cache();
            let (_, outcome) = storage.reload().unwrap();
            assert_eq!(outcome, LoadOutcome::Recovered(ShadowKind::BeforeWrite));
        }

        let mut contents: Vec<Vec<u8>> = corrupt_files(&dir)
            .iter()
            .map(|path| fs::read(path).unwrap())
            .collect();
        contents.sort();
        assert_eq!(
            contents,
            vec![b"first broken write".to_vec(), b"second broken write".to_vec()]
        );
    }

    #[test]
    fn missing_primary_recovers_from_after_write_shadow() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let repository = Repository::with_sample_notes();
        storage.save(&repository).unwrap();
        fs::rename(storage.path(), storage.shadow_path(ShadowKind::AfterWrite)).unwrap();

        let (recovered, outcome) = storage.reload().unwrap();
        assert_eq!(outcome, LoadOutcome::Recovered(ShadowKind::AfterWrite));
        assert_eq!(recovered, repository);
    }

    #[test]
    fn tiny_shadow_is_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        fs::write(storage.path(), b"broken").unwrap();
        fs::write(storage.shadow_path(ShadowKind::BeforeWrite), b"{}").unwrap();

        assert!(storage.reload().unwrap_err().is_invalid_repository());
    }

    #[test]
    fn old_revision_is_upgraded_and_persisted() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        fs::write(
            storage.path(),
            br#"{
                "id": "6f0e1c4b-8f57-4a55-9d39-2d3f0b6b1a11",
                "revision": 1,
                "notes": [],
                "deleted_notes": []
            }"#,
        )
        .unwrap();

        let (repository, outcome) = storage.reload().unwrap();
        assert_eq!(outcome, LoadOutcome::Upgraded);
        assert_eq!(repository.revision, crate::types::NEWEST_SUPPORTED_REVISION);

        storage.clear_cache();
        assert_eq!(storage.reload().unwrap().1, LoadOutcome::Loaded);
    }

    #[test]
    fn newer_revision_is_refused() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let mut document = serde_json::to_value(Repository::new()).unwrap();
        document["revision"] = serde_json::json!(99);
        fs::write(storage.path(), serde_json::to_vec(&document).unwrap()).unwrap();

        assert!(matches!(
            storage.reload(),
            Err(CoreError::UnsupportedRevision { revision: 99, .. })
        ));
    }
}
