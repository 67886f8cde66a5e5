//! Persisted synchronization settings.

use crate::cloud::CloudCredentials;
use crate::error::SyncResult;
use crate::transfer_code::TransferCode;
use notesync_core::StorageProfile;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Settings file name of the production profile.
pub const SETTINGS_FILE_NAME: &str = "notesync_settings.json";

/// Settings file name of the development profile.
pub const DEV_SETTINGS_FILE_NAME: &str = "notesync_settings_dev.json";

/// Returns the settings file name belonging to a storage profile.
pub fn settings_file_name(profile: StorageProfile) -> &'static str {
    match profile {
        StorageProfile::Production => SETTINGS_FILE_NAME,
        StorageProfile::Development => DEV_SETTINGS_FILE_NAME,
    }
}

/// Settings the synchronization reads and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Chosen cloud storage, `None` until the user picked one.
    #[serde(default)]
    pub credentials: Option<CloudCredentials>,
    /// Code encrypting the cloud copy.
    #[serde(default)]
    pub transfer_code: Option<TransferCode>,
    /// Replaced codes, newest first, tried when the current code fails.
    #[serde(default)]
    pub transfer_code_history: Vec<TransferCode>,
    /// Whether automatic startup/shutdown synchronizations are wanted.
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,
}

fn default_auto_sync() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            transfer_code: None,
            transfer_code_history: Vec::new(),
            auto_sync: default_auto_sync(),
        }
    }
}

impl SyncSettings {
    /// Makes `code` the current transfer code.
    ///
    /// The previous code moves to the front of the history, which is capped
    /// at `history_limit` entries. A code is never kept twice.
    pub fn set_transfer_code(&mut self, code: TransferCode, history_limit: usize) {
        if self.transfer_code.as_ref() == Some(&code) {
            return;
        }
        if let Some(previous) = self.transfer_code.replace(code.clone()) {
            self.transfer_code_history.insert(0, previous);
        }
        self.transfer_code_history.retain(|old| *old != code);
        let mut seen = Vec::with_capacity(self.transfer_code_history.len());
        self.transfer_code_history.retain(|old| {
            if seen.contains(old) {
                false
            } else {
                seen.push(old.clone());
                true
            }
        });
        self.transfer_code_history.truncate(history_limit);
    }

    /// Returns true if any code is known, current or historic.
    pub fn has_transfer_code(&self) -> bool {
        self.transfer_code.is_some() || !self.transfer_code_history.is_empty()
    }

    /// Known codes in the order they should be tried.
    pub fn candidate_codes(&self) -> impl Iterator<Item = &TransferCode> {
        self.transfer_code
            .iter()
            .chain(self.transfer_code_history.iter())
    }
}

/// Loads and saves [`SyncSettings`].
pub trait SettingsStore: Send + Sync {
    /// Loads the settings; missing settings yield the defaults.
    fn load(&self) -> SyncResult<SyncSettings>;

    /// Saves the settings.
    fn save(&self, settings: &SyncSettings) -> SyncResult<()>;
}

/// Settings kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Creates a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store using the file name of `profile` in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>, profile: StorageProfile) -> Self {
        Self::new(dir.as_ref().join(settings_file_name(profile)))
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> SyncResult<SyncSettings> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(SyncSettings::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, settings: &SyncSettings) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// Settings kept in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<SyncSettings>,
}

impl MemorySettingsStore {
    /// Creates a store holding the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `settings`.
    pub fn with_settings(settings: SyncSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> SyncResult<SyncSettings> {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &SyncSettings) -> SyncResult<()> {
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}
