//! Init command implementation.

use notesync_core::StorageProfile;
use notesync_sync_engine::{
    CloudCredentials, FileSettingsStore, SettingsStore, SyncConfig, TransferCode,
};
use std::path::Path;
use tracing::info;

/// Stores a folder as the cloud location, and optionally a known transfer code.
pub fn run(
    data_dir: &Path,
    profile: StorageProfile,
    cloud_dir: &Path,
    transfer_code: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !cloud_dir.is_dir() {
        return Err(format!("Cloud folder {:?} does not exist", cloud_dir).into());
    }

    let config = SyncConfig::new(profile);
    let store = FileSettingsStore::in_dir(data_dir, config.profile);
    let mut settings = store.load()?;
    settings.credentials = Some(CloudCredentials::folder(cloud_dir));
    if let Some(code) = transfer_code {
        let code = TransferCode::parse(code)?;
        settings.set_transfer_code(code, config.transfer_code_history_limit);
    }
    store.save(&settings)?;

    info!(settings = %store.path().display(), "configured cloud folder");
    println!("Cloud folder: {}", cloud_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROFILE: StorageProfile = StorageProfile::Development;

    #[test]
    fn stores_folder_and_code() {
        let data = TempDir::new().unwrap();
        let cloud = TempDir::new().unwrap();

        run(data.path(), PROFILE, cloud.path(), Some("abcd-efgh-jkmn-pqrs")).unwrap();

        let settings = FileSettingsStore::in_dir(data.path(), PROFILE).load().unwrap();
        assert_eq!(settings.credentials, Some(CloudCredentials::folder(cloud.path())));
        assert_eq!(
            settings.transfer_code.map(|code| code.as_str().to_string()),
            Some("abcdefghjkmnpqrs".to_string())
        );
    }

    #[test]
    fn rejects_missing_folder_and_bad_code() {
        let data = TempDir::new().unwrap();
        let cloud = TempDir::new().unwrap();

        assert!(run(data.path(), PROFILE, &cloud.path().join("missing"), None).is_err());
        assert!(run(data.path(), PROFILE, cloud.path(), Some("nope")).is_err());
    }
}
