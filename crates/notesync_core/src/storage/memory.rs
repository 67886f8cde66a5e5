//! In-memory repository storage for tests and tools.

use super::{LoadOutcome, RepositoryStorage};
use crate::error::CoreResult;
use crate::model::Repository;
use parking_lot::RwLock;

/// Keeps the "stored" repository in memory.
///
/// Reloading an empty storage creates a sample repository, the same way a
/// fresh install does.
#[derive(Debug, Default)]
pub struct MemoryRepositoryStorage {
    stored: RwLock<Option<Repository>>,
    cache: RwLock<Option<Repository>>,
    saves: RwLock<usize>,
}

impl MemoryRepositoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage already holding `repository`.
    #[must_use]
    pub fn with_repository(repository: Repository) -> Self {
        Self {
            stored: RwLock::new(Some(repository)),
            ..Self::default()
        }
    }

    /// Returns the stored repository, bypassing the cache.
    #[must_use]
    pub fn stored(&self) -> Option<Repository> {
        self.stored.read().clone()
    }

    /// Returns how many times [`RepositoryStorage::save`] was called.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.read()
    }
}

impl RepositoryStorage for MemoryRepositoryStorage {
    fn reload(&self) -> CoreResult<(Repository, LoadOutcome)> {
        let mut stored = self.stored.write();
        let (repository, outcome) = match stored.as_ref() {
            Some(repository) => (repository.clone(), LoadOutcome::Loaded),
            None => {
                let repository = Repository::with_sample_notes();
                *stored = Some(repository.clone());
                (repository, LoadOutcome::Created)
            }
        };
        *self.cache.write() = Some(repository.clone());
        Ok((repository, outcome))
    }

    fn save(&self, repository: &Repository) -> CoreResult<()> {
        *self.stored.write() = Some(repository.clone());
        *self.cache.write() = Some(repository.clone());
        *self.saves.write() += 1;
        Ok(())
    }

    fn cached(&self) -> Option<Repository> {
        self.cache.read().clone()
    }

    fn clear_cache(&self) {
        *self.cache.write() = None;
    }
}
