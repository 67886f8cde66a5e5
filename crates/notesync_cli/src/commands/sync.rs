//! Sync command implementation.

use super::console::ConsoleInteraction;
use notesync_core::{FileRepositoryStorage, StorageProfile};
use notesync_sync_engine::{
    CloudCredentials, CloudStorageRegistry, FileSettingsStore, FolderCloudStorage, SettingsStore,
    StoryMode, StoryOutcome, SyncConfig, SyncService, SyncSettings, SyncTrigger, TransferCode,
    FOLDER_PROVIDER,
};
use std::path::Path;
use std::sync::Arc;

/// Runs one manual synchronization against a folder cloud.
pub fn run(
    data_dir: &Path,
    profile: StorageProfile,
    cloud_dir: Option<&Path>,
    silent: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::new(profile);
    let settings = Arc::new(FileSettingsStore::in_dir(data_dir, config.profile));
    let mut before = settings.load()?;
    if let Some(dir) = cloud_dir {
        before.credentials = Some(CloudCredentials::folder(dir));
        settings.save(&before)?;
    }

    let storage = Arc::new(FileRepositoryStorage::new(data_dir, config.profile));
    let service = Arc::new(SyncService::new(
        config,
        storage,
        Arc::new(
            CloudStorageRegistry::new()
                .with_provider(FOLDER_PROVIDER, Arc::new(FolderCloudStorage::new())),
        ),
        settings.clone(),
        Arc::new(ConsoleInteraction::new(cloud_dir.map(Path::to_path_buf))),
    ));
    let mode = if silent {
        StoryMode::SILENT
    } else {
        StoryMode::INTERACTIVE
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime
        .block_on(async { service.spawn_synchronize(SyncTrigger::Manually, mode).await })??;

    match &report.outcome {
        StoryOutcome::NoOp => println!("Nothing to synchronize."),
        StoryOutcome::Stored {
            local_changed,
            uploaded,
        } => {
            println!(
                "Synchronized (local {}, cloud {}) in {} ms.",
                if *local_changed { "updated" } else { "unchanged" },
                if *uploaded { "updated" } else { "unchanged" },
                report.duration.as_millis()
            );
        }
        StoryOutcome::Cancelled => println!("Synchronization cancelled."),
        StoryOutcome::AwaitingContinuation => println!("Waiting for authorization."),
        StoryOutcome::Failed(err) => return Err(format!("Synchronization failed: {err}").into()),
    }

    // Interactive runs show a generated code through the console dialogs.
    if silent {
        if let Some(code) = generated_code(&before, &settings.load()?) {
            println!("New transfer code: {code}");
            println!("Other devices need it to read the cloud repository.");
        }
    }
    Ok(())
}

/// Returns the transfer code a run generated, if any.
fn generated_code(before: &SyncSettings, after: &SyncSettings) -> Option<TransferCode> {
    match &after.transfer_code {
        Some(code) if before.transfer_code.as_ref() != Some(code) => Some(code.clone()),
        _ => None,
    }
}
