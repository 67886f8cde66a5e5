//! Repository persistence.
//!
//! A [`RepositoryStorage`] owns the single live instance of the local
//! repository. [`RepositoryStorage::load`] hands out the cached instance
//! and only touches the disk on first use; [`RepositoryStorage::reload`]
//! always reads the document again.

mod document;
mod file;
mod memory;
mod updater;

pub use document::{decode_document, encode_document, DecodedRepository};
pub use file::{FileRepositoryStorage, StorageProfile, MIN_PLAUSIBLE_SIZE};
pub use memory::MemoryRepositoryStorage;
pub use updater::{document_revision, DefaultRepositoryUpdater, RepositoryUpdater};

use crate::error::CoreResult;
use crate::model::Repository;

/// Shadow files written around a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowKind {
    /// Copy of the previous document, kept while the new one is moved in.
    BeforeWrite,
    /// The new document, before it replaces the previous one.
    AfterWrite,
}

/// How a repository was obtained by [`RepositoryStorage::reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Read as is.
    Loaded,
    /// Read from an older revision and written back upgraded.
    Upgraded,
    /// No document existed, a new repository was created and saved.
    Created,
    /// The primary document was unusable and a shadow file was promoted.
    Recovered(ShadowKind),
}

/// Persistence of the local repository.
pub trait RepositoryStorage: Send + Sync {
    /// Reads the repository from the backing store, replacing the cache.
    ///
    /// # Errors
    ///
    /// - `InvalidRepository` if the document is corrupt and cannot be
    ///   recovered; the document is left untouched
    /// - `UnsupportedRevision` if it was written by a newer engine
    /// - `StorageUnavailable` on I/O failures
    fn reload(&self) -> CoreResult<(Repository, LoadOutcome)>;

    /// Writes the repository and makes it the cached instance.
    fn save(&self, repository: &Repository) -> CoreResult<()>;

    /// Returns the cached instance, if any.
    fn cached(&self) -> Option<Repository>;

    /// Forgets the cached instance so the next [`load`](Self::load) reads
    /// from the backing store.
    fn clear_cache(&self);

    /// Returns the cached instance, reading it on first use.
    fn load(&self) -> CoreResult<Repository> {
        match self.cached() {
            Some(repository) => Ok(repository),
            None => self.reload().map(|(repository, _)| repository),
        }
    }
}
