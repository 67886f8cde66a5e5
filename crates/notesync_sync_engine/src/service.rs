//! Entry point for synchronizations.

use crate::cloud::CloudStorageFactory;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::{SyncStateGuard, SyncTrigger};
use crate::interaction::Interaction;
use crate::settings::SettingsStore;
use crate::story::{run_story, StepId, StoryMode, StoryOutcome, StoryState, SyncContext};
use notesync_core::storage::RepositoryStorage;
use notesync_core::{AesGcmCryptor, Cryptor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of one synchronization run.
#[derive(Debug)]
pub struct SyncReport {
    /// What started the run.
    pub trigger: SyncTrigger,
    /// How the story ended.
    pub outcome: StoryOutcome,
    /// Fingerprint of the local repository before the run.
    pub fingerprint_before: Option<i64>,
    /// Fingerprint of the local repository after the run.
    pub fingerprint_after: Option<i64>,
    /// Duration of the run.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if the local repository changed and views showing it
    /// must be refreshed.
    pub fn repository_changed(&self) -> bool {
        self.fingerprint_before != self.fingerprint_after
    }
}

/// Runs synchronizations against the configured collaborators.
pub struct SyncService {
    config: SyncConfig,
    storage: Arc<dyn RepositoryStorage>,
    cloud: Arc<dyn CloudStorageFactory>,
    settings: Arc<dyn SettingsStore>,
    cryptor: Arc<dyn Cryptor>,
    interaction: Arc<dyn Interaction>,
    guard: Arc<SyncStateGuard>,
    last_synced_fingerprint: Mutex<Option<i64>>,
}

impl SyncService {
    /// Creates a service with the default cryptor and its own guard.
    pub fn new(
        config: SyncConfig,
        storage: Arc<dyn RepositoryStorage>,
        cloud: Arc<dyn CloudStorageFactory>,
        settings: Arc<dyn SettingsStore>,
        interaction: Arc<dyn Interaction>,
    ) -> Self {
        Self {
            config,
            storage,
            cloud,
            settings,
            cryptor: Arc::new(AesGcmCryptor::new()),
            interaction,
            guard: Arc::new(SyncStateGuard::new()),
            last_synced_fingerprint: Mutex::new(None),
        }
    }

    /// Shares an existing guard, e.g. with the application shell.
    pub fn with_guard(mut self, guard: Arc<SyncStateGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Replaces the cryptor.
    pub fn with_cryptor(mut self, cryptor: Arc<dyn Cryptor>) -> Self {
        self.cryptor = cryptor;
        self
    }

    /// Returns the guard.
    pub fn guard(&self) -> &Arc<SyncStateGuard> {
        &self.guard
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs a synchronization on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentSyncRejected` if another run is in progress or
    /// awaiting its continuation. Every other failure is reported in
    /// [`SyncReport::outcome`].
    pub fn synchronize(&self, trigger: SyncTrigger, mode: StoryMode) -> SyncResult<SyncReport> {
        if !self.guard.try_start(trigger) {
            return Err(SyncError::ConcurrentSyncRejected);
        }
        Ok(self.run(trigger, mode, StepId::IsCloudServiceSet))
    }

    /// Continues a run parked for an external authorization.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentSyncRejected` if no run is parked.
    pub fn resume(&self, trigger: SyncTrigger, mode: StoryMode) -> SyncResult<SyncReport> {
        if !self.guard.try_resume(trigger) {
            return Err(SyncError::ConcurrentSyncRejected);
        }
        Ok(self.run(trigger, mode, StepId::ExistsCloudRepository))
    }

    /// Runs a synchronization on tokio's blocking pool.
    pub fn spawn_synchronize(
        self: &Arc<Self>,
        trigger: SyncTrigger,
        mode: StoryMode,
    ) -> JoinHandle<SyncResult<SyncReport>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.synchronize(trigger, mode))
    }

    /// Returns true if the startup synchronization should run.
    pub fn should_sync_at_startup(&self) -> bool {
        self.config.auto_sync_at_startup && self.auto_sync_configured()
    }

    /// Returns true if the shutdown synchronization should run.
    ///
    /// It is skipped when the repository is unchanged since the last
    /// successful startup or manual synchronization.
    pub fn should_sync_at_shutdown(&self, current_fingerprint: i64) -> bool {
        if !self.config.auto_sync_at_shutdown || !self.auto_sync_configured() {
            return false;
        }
        *self.last_synced_fingerprint.lock() != Some(current_fingerprint)
    }

    /// Returns the fingerprint recorded after the last successful run.
    pub fn last_synced_fingerprint(&self) -> Option<i64> {
        *self.last_synced_fingerprint.lock()
    }

    fn auto_sync_configured(&self) -> bool {
        match self.settings.load() {
            Ok(settings) => settings.auto_sync && settings.credentials.is_some(),
            Err(err) => {
                warn!(error = %err, "could not read sync settings");
                false
            }
        }
    }

    fn local_fingerprint(&self) -> Option<i64> {
        self.storage
            .load()
            .map(|repository| repository.fingerprint())
            .ok()
    }

    fn run(&self, trigger: SyncTrigger, mode: StoryMode, start: StepId) -> SyncReport {
        let started = Instant::now();
        let fingerprint_before = self.local_fingerprint();

        let outcome = match self.settings.load() {
            Ok(settings) => {
                let mut state = StoryState::new(settings);
                let context = SyncContext {
                    storage: self.storage.as_ref(),
                    cloud: self.cloud.as_ref(),
                    settings: self.settings.as_ref(),
                    cryptor: self.cryptor.as_ref(),
                    interaction: self.interaction.as_ref(),
                    guard: &self.guard,
                    config: &self.config,
                };
                run_story(start, &mut state, &context, mode)
            }
            Err(err) => StoryOutcome::Failed(err),
        };

        let fingerprint_after = self.local_fingerprint();
        if outcome.is_success() && trigger != SyncTrigger::AtShutdown {
            *self.last_synced_fingerprint.lock() = fingerprint_after;
        }
        self.guard.stop();

        let report = SyncReport {
            trigger,
            outcome,
            fingerprint_before,
            fingerprint_after,
            duration: started.elapsed(),
        };
        info!(
            ?trigger,
            outcome = ?report.outcome,
            changed = report.repository_changed(),
            duration_ms = report.duration.as_millis() as u64,
            "synchronization finished"
        );
        report
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("guard", &self.guard)
            .finish()
    }
}
