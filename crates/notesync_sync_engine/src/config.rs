//! Configuration for the sync engine.

use notesync_core::StorageProfile;

/// Default number of previous transfer codes kept to decrypt older cloud copies.
pub const DEFAULT_TRANSFER_CODE_HISTORY_LIMIT: usize = 5;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Storage profile, keeps development data apart from production data.
    pub profile: StorageProfile,
    /// Whether the application synchronizes silently after startup.
    pub auto_sync_at_startup: bool,
    /// Whether the application synchronizes before shutting down.
    pub auto_sync_at_shutdown: bool,
    /// How many replaced transfer codes are remembered.
    pub transfer_code_history_limit: usize,
}

impl SyncConfig {
    /// Creates a configuration for the given profile.
    pub fn new(profile: StorageProfile) -> Self {
        Self {
            profile,
            auto_sync_at_startup: true,
            auto_sync_at_shutdown: true,
            transfer_code_history_limit: DEFAULT_TRANSFER_CODE_HISTORY_LIMIT,
        }
    }

    /// Enables or disables the startup synchronization.
    pub fn with_auto_sync_at_startup(mut self, enabled: bool) -> Self {
        self.auto_sync_at_startup = enabled;
        self
    }

    /// Enables or disables the shutdown synchronization.
    pub fn with_auto_sync_at_shutdown(mut self, enabled: bool) -> Self {
        self.auto_sync_at_shutdown = enabled;
        self
    }

    /// Sets how many replaced transfer codes are remembered.
    pub fn with_transfer_code_history_limit(mut self, limit: usize) -> Self {
        self.transfer_code_history_limit = limit;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(StorageProfile::Production)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new(StorageProfile::Development)
            .with_auto_sync_at_startup(false)
            .with_transfer_code_history_limit(2);

        assert_eq!(config.profile, StorageProfile::Development);
        assert!(!config.auto_sync_at_startup);
        assert!(config.auto_sync_at_shutdown);
        assert_eq!(config.transfer_code_history_limit, 2);
    }

    #[test]
    fn default_is_production() {
        let config = SyncConfig::default();
        assert_eq!(config.profile, StorageProfile::Production);
        assert_eq!(
            config.transfer_code_history_limit,
            DEFAULT_TRANSFER_CODE_HISTORY_LIMIT
        );
    }
}
