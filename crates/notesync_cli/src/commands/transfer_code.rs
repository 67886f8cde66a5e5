//! Transfer code command implementation.

use notesync_core::StorageProfile;
use notesync_sync_engine::{FileSettingsStore, SettingsStore, SyncSettings};
use std::path::Path;

/// Prints the current transfer code and the codes kept from before.
pub fn run(data_dir: &Path, profile: StorageProfile) -> Result<(), Box<dyn std::error::Error>> {
    let settings = FileSettingsStore::in_dir(data_dir, profile).load()?;
    for line in describe(&settings) {
        println!("{line}");
    }
    Ok(())
}

fn describe(settings: &SyncSettings) -> Vec<String> {
    let mut lines = Vec::new();
    match &settings.transfer_code {
        Some(code) => lines.push(format!("Transfer code: {code}")),
        None => lines.push("No transfer code yet, run sync to create one.".to_string()),
    }
    if !settings.transfer_code_history.is_empty() {
        lines.push("Previous codes:".to_string());
        lines.extend(
            settings
                .transfer_code_history
                .iter()
                .map(|code| format!("  {code}")),
        );
    }
    lines
}
