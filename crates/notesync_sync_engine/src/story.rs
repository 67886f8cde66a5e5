//! The synchronization step chain.
//!
//! A synchronization is a story: a chain of small steps, each of which
//! either names the next step or ends the story with an outcome. The chain
//! is a closed [`StepId`] enum plus the transition function [`run_step`],
//! so every path through it can be tested on its own.
//!
//! ```text
//! IsCloudServiceSet ──► ExistsCloudRepository ──► DownloadCloudRepository
//!        │                     │ (missing)                 │
//!        ▼ (dialogs)           ▼                           ▼
//! ShowCloudStorageChoice  StoreLocalRepositoryToCloudAndQuit
//!                                                ExistsTransferCode ──► DecryptCloudRepository
//!                                                        │ (dialogs)         │
//!                                                        ▼                   ▼
//!                                                ShowTransferCodeEntry  IsSameRepository
//!                                                                            │
//!                                                     ┌──────────────────────┤
//!                                                     ▼ (other id)           ▼
//!                                               ShowMergeChoice   StoreMergedRepositoryAndQuit
//! ```
//!
//! Nothing is written, locally or to the cloud, before one of the
//! `...AndQuit` steps. A failing step therefore never leaves a partial
//! merge behind.

use crate::cloud::{CloudCredentials, CloudStorage, CloudStorageFactory};
use crate::cloud_document::{decrypt_repository, encrypt_repository};
use crate::config::SyncConfig;
use crate::error::{CloudStorageError, SyncError, SyncResult};
use crate::guard::SyncStateGuard;
use crate::interaction::{Interaction, MergeChoice};
use crate::settings::{SettingsStore, SyncSettings};
use crate::transfer_code::TransferCode;
use notesync_core::storage::{DefaultRepositoryUpdater, RepositoryStorage};
use notesync_core::{merge_with_report, Cryptor, Repository};
use std::ops::BitOr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifies a step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    /// Checks that cloud credentials are configured.
    IsCloudServiceSet,
    /// Lets the user pick a cloud storage.
    ShowCloudStorageChoice,
    /// Checks whether the cloud holds a repository.
    ExistsCloudRepository,
    /// Downloads the encrypted cloud repository.
    DownloadCloudRepository,
    /// Starts an external authorization and parks the story.
    ShowCloudAuthorization,
    /// Checks that a transfer code is known.
    ExistsTransferCode,
    /// Asks the user for the transfer code.
    ShowTransferCodeEntry,
    /// Decrypts the cloud repository.
    DecryptCloudRepository,
    /// Compares the local and the cloud repository.
    IsSameRepository,
    /// Asks how to combine two unrelated repositories.
    ShowMergeChoice,
    /// Merges both repositories, stores the result and uploads it if needed.
    StoreMergedRepositoryAndQuit,
    /// Uploads the local repository, replacing the cloud copy.
    StoreLocalRepositoryToCloudAndQuit,
    /// Replaces the local repository with the cloud copy.
    StoreCloudRepositoryToDeviceAndQuit,
}

/// What a story may show to the user, as a set of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StoryMode(u8);

impl StoryMode {
    /// Nothing is shown, every question is answered with "abort".
    pub const SILENT: StoryMode = StoryMode(0);
    /// A busy indicator while the story runs.
    pub const BUSY_INDICATOR: StoryMode = StoryMode(1);
    /// Short notifications about the result.
    pub const TOASTS: StoryMode = StoryMode(1 << 1);
    /// Messages the user has to acknowledge, e.g. errors.
    pub const MESSAGES: StoryMode = StoryMode(1 << 2);
    /// Dialogs asking the user for decisions or input.
    pub const DIALOGS: StoryMode = StoryMode(1 << 3);
    /// Everything, used for manual synchronizations.
    pub const INTERACTIVE: StoryMode = StoryMode(0b1111);

    /// Returns true if every flag of `other` is set.
    pub fn contains(self, other: StoryMode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    pub fn is_silent(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for StoryMode {
    type Output = StoryMode;

    fn bitor(self, rhs: StoryMode) -> StoryMode {
        StoryMode(self.0 | rhs.0)
    }
}

/// How a story ended.
#[derive(Debug)]
pub enum StoryOutcome {
    /// Nothing to do, or the story was abandoned quietly.
    NoOp,
    /// Data was written.
    Stored {
        /// The local repository changed.
        local_changed: bool,
        /// The cloud copy was replaced.
        uploaded: bool,
    },
    /// The user cancelled.
    Cancelled,
    /// Parked until an external authorization completes.
    AwaitingContinuation,
    /// A step failed; nothing was written.
    Failed(SyncError),
}

impl StoryOutcome {
    /// Returns true unless the story failed.
    pub fn is_success(&self) -> bool {
        !matches!(self, StoryOutcome::Failed(_))
    }
}

/// Result of one step.
#[derive(Debug)]
pub enum StepResult {
    /// Continue with another step.
    Next(StepId),
    /// The story is over.
    Finished(StoryOutcome),
}

/// Data collected while the story runs.
#[derive(Debug, Default)]
pub struct StoryState {
    /// Settings as loaded at the start, updated by the steps.
    pub settings: SyncSettings,
    /// Encrypted cloud repository.
    pub cloud_data: Option<Vec<u8>>,
    /// Decrypted cloud repository.
    pub cloud_repository: Option<Repository>,
    /// Code the user entered in this story.
    pub entered_code: Option<TransferCode>,
    /// Code that decrypted the cloud repository.
    pub working_code: Option<TransferCode>,
    /// True after an entered code was rejected.
    pub code_rejected: bool,
}

impl StoryState {
    /// Creates the state for a story using `settings`.
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }
}

/// Collaborators of a story.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    /// Local repository storage.
    pub storage: &'a dyn RepositoryStorage,
    /// Cloud storage clients.
    pub cloud: &'a dyn CloudStorageFactory,
    /// Settings persistence.
    pub settings: &'a dyn SettingsStore,
    /// Encrypts the cloud copy.
    pub cryptor: &'a dyn Cryptor,
    /// The UI.
    pub interaction: &'a dyn Interaction,
    /// The single-flight guard.
    pub guard: &'a SyncStateGuard,
    /// Engine configuration.
    pub config: &'a SyncConfig,
}

/// Runs a story from `start` until it finishes.
pub fn run_story(
    start: StepId,
    state: &mut StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> StoryOutcome {
    if mode.contains(StoryMode::BUSY_INDICATOR) {
        context.interaction.set_busy(true);
    }

    let mut step = start;
    let outcome = loop {
        match run_step(step, state, context, mode) {
            StepResult::Next(next) => {
                debug!(from = ?step, to = ?next, "sync step");
                step = next;
            }
            StepResult::Finished(outcome) => {
                debug!(last = ?step, ?outcome, "sync story finished");
                break outcome;
            }
        }
    };

    if mode.contains(StoryMode::BUSY_INDICATOR) {
        context.interaction.set_busy(false);
    }
    outcome
}

/// Runs a single step.
pub fn run_step(
    step: StepId,
    state: &mut StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> StepResult {
    let result = match step {
        StepId::IsCloudServiceSet => is_cloud_service_set(state, mode),
        StepId::ShowCloudStorageChoice => show_cloud_storage_choice(state, context),
        StepId::ExistsCloudRepository => exists_cloud_repository(state, context, mode),
        StepId::DownloadCloudRepository => download_cloud_repository(state, context, mode),
        StepId::ShowCloudAuthorization => show_cloud_authorization(state, context),
        StepId::ExistsTransferCode => exists_transfer_code(state, mode),
        StepId::ShowTransferCodeEntry => show_transfer_code_entry(state, context),
        StepId::DecryptCloudRepository => decrypt_cloud_repository(state, context, mode),
        StepId::IsSameRepository => is_same_repository(state, context, mode),
        StepId::ShowMergeChoice => show_merge_choice(context),
        StepId::StoreMergedRepositoryAndQuit => store_merged_repository(state, context, mode),
        StepId::StoreLocalRepositoryToCloudAndQuit => {
            store_local_repository_to_cloud(state, context, mode)
        }
        StepId::StoreCloudRepositoryToDeviceAndQuit => {
            store_cloud_repository_to_device(state, context, mode)
        }
    };

    match result {
        Ok(result) => result,
        Err(err) => fail(err, step, context, mode),
    }
}

fn fail(err: SyncError, step: StepId, context: &SyncContext<'_>, mode: StoryMode) -> StepResult {
    warn!(?step, error = %err, "synchronization failed");
    if mode.contains(StoryMode::MESSAGES) {
        context.interaction.show_message(&err.to_string());
    }
    StepResult::Finished(StoryOutcome::Failed(err))
}

fn credentials(state: &StoryState) -> SyncResult<&CloudCredentials> {
    state
        .settings
        .credentials
        .as_ref()
        .ok_or_else(|| SyncError::remote_unavailable("no cloud storage configured"))
}

fn cloud_client(
    state: &StoryState,
    context: &SyncContext<'_>,
) -> SyncResult<(Arc<dyn CloudStorage>, CloudCredentials)> {
    let credentials = credentials(state)?.clone();
    let client = context.cloud.create(&credentials)?;
    Ok((client, credentials))
}

fn authorization_or_fail(err: CloudStorageError, mode: StoryMode) -> SyncResult<StepResult> {
    match err {
        CloudStorageError::AuthorizationRequired if mode.contains(StoryMode::DIALOGS) => {
            Ok(StepResult::Next(StepId::ShowCloudAuthorization))
        }
        err => Err(err.into()),
    }
}

fn is_cloud_service_set(state: &StoryState, mode: StoryMode) -> SyncResult<StepResult> {
    if state.settings.credentials.is_some() {
        Ok(StepResult::Next(StepId::ExistsCloudRepository))
    } else if mode.contains(StoryMode::DIALOGS) {
        Ok(StepResult::Next(StepId::ShowCloudStorageChoice))
    } else {
        debug!("no cloud storage configured");
        Ok(StepResult::Finished(StoryOutcome::NoOp))
    }
}

fn show_cloud_storage_choice(
    state: &mut StoryState,
    context: &SyncContext<'_>,
) -> SyncResult<StepResult> {
    let providers = context.cloud.providers();
    let Some(credentials) = context.interaction.choose_cloud_storage(&providers) else {
        return Ok(StepResult::Finished(StoryOutcome::Cancelled));
    };
    info!(provider = %credentials.provider, "cloud storage chosen");
    state.settings.credentials = Some(credentials);
    context.settings.save(&state.settings)?;
    Ok(StepResult::Next(StepId::ExistsCloudRepository))
}

fn exists_cloud_repository(
    state: &StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let (client, credentials) = cloud_client(state, context)?;
    match client.exists(&credentials) {
        Ok(true) => Ok(StepResult::Next(StepId::DownloadCloudRepository)),
        Ok(false) => Ok(StepResult::Next(StepId::StoreLocalRepositoryToCloudAndQuit)),
        Err(err) => authorization_or_fail(err, mode),
    }
}

fn download_cloud_repository(
    state: &mut StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let (client, credentials) = cloud_client(state, context)?;
    match client.download(&credentials) {
        Ok(data) => {
            debug!(bytes = data.len(), "downloaded cloud repository");
            state.cloud_data = Some(data);
            Ok(StepResult::Next(StepId::ExistsTransferCode))
        }
        // Deleted between the existence check and the download.
        Err(CloudStorageError::NotFound) => {
            Ok(StepResult::Next(StepId::StoreLocalRepositoryToCloudAndQuit))
        }
        Err(err) => authorization_or_fail(err, mode),
    }
}

fn show_cloud_authorization(
    state: &StoryState,
    context: &SyncContext<'_>,
) -> SyncResult<StepResult> {
    let credentials = credentials(state)?;
    context.guard.set_awaiting_continuation(true);
    context.interaction.open_authorization(credentials);
    info!(provider = %credentials.provider, "waiting for cloud authorization");
    Ok(StepResult::Finished(StoryOutcome::AwaitingContinuation))
}

fn exists_transfer_code(state: &StoryState, mode: StoryMode) -> SyncResult<StepResult> {
    if state.entered_code.is_some() || state.settings.has_transfer_code() {
        Ok(StepResult::Next(StepId::DecryptCloudRepository))
    } else if mode.contains(StoryMode::DIALOGS) {
        Ok(StepResult::Next(StepId::ShowTransferCodeEntry))
    } else {
        debug!("no transfer code known, skipping synchronization");
        Ok(StepResult::Finished(StoryOutcome::NoOp))
    }
}

fn show_transfer_code_entry(
    state: &mut StoryState,
    context: &SyncContext<'_>,
) -> SyncResult<StepResult> {
    let Some(input) = context.interaction.ask_transfer_code(state.code_rejected) else {
        return Ok(StepResult::Finished(StoryOutcome::Cancelled));
    };
    match TransferCode::parse(&input) {
        Ok(code) => {
            state.entered_code = Some(code);
            Ok(StepResult::Next(StepId::DecryptCloudRepository))
        }
        Err(err) => {
            context.interaction.show_message(&err.to_string());
            state.code_rejected = true;
            Ok(StepResult::Next(StepId::ShowTransferCodeEntry))
        }
    }
}

fn decrypt_cloud_repository(
    state: &mut StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let data = state
        .cloud_data
        .as_deref()
        .ok_or_else(|| SyncError::remote_unavailable("cloud repository not downloaded"))?;

    let candidates: Vec<TransferCode> = state
        .entered_code
        .iter()
        .chain(state.settings.candidate_codes())
        .cloned()
        .collect();

    for code in candidates {
        match decrypt_repository(data, &code, context.cryptor, &DefaultRepositoryUpdater) {
            Ok(repository) => {
                if state.entered_code.as_ref() == Some(&code) {
                    state
                        .settings
                        .set_transfer_code(code.clone(), context.config.transfer_code_history_limit);
                    context.settings.save(&state.settings)?;
                    info!("stored entered transfer code");
                }
                state.cloud_repository = Some(repository);
                state.working_code = Some(code);
                return Ok(StepResult::Next(StepId::IsSameRepository));
            }
            Err(SyncError::DecryptionFailed) => continue,
            Err(err) => return Err(err),
        }
    }

    if mode.contains(StoryMode::DIALOGS) {
        state.entered_code = None;
        state.code_rejected = true;
        Ok(StepResult::Next(StepId::ShowTransferCodeEntry))
    } else {
        Err(SyncError::DecryptionFailed)
    }
}

fn cloud_repository(state: &StoryState) -> SyncResult<&Repository> {
    state
        .cloud_repository
        .as_ref()
        .ok_or(SyncError::DecryptionFailed)
}

fn is_same_repository(
    state: &StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let local = context.storage.load()?;
    let cloud = cloud_repository(state)?;

    if local.id != cloud.id {
        if mode.contains(StoryMode::DIALOGS) {
            return Ok(StepResult::Next(StepId::ShowMergeChoice));
        }
        warn!(local = %local.id, cloud = %cloud.id, "cloud holds a different repository, skipping");
        return Ok(StepResult::Finished(StoryOutcome::NoOp));
    }

    if local.fingerprint() == cloud.fingerprint() {
        debug!("repositories are in sync");
        return Ok(StepResult::Finished(StoryOutcome::NoOp));
    }
    Ok(StepResult::Next(StepId::StoreMergedRepositoryAndQuit))
}

fn show_merge_choice(context: &SyncContext<'_>) -> SyncResult<StepResult> {
    let next = match context.interaction.choose_merge() {
        Some(MergeChoice::KeepLocal) => StepId::StoreLocalRepositoryToCloudAndQuit,
        Some(MergeChoice::KeepCloud) => StepId::StoreCloudRepositoryToDeviceAndQuit,
        Some(MergeChoice::Merge) => StepId::StoreMergedRepositoryAndQuit,
        None => return Ok(StepResult::Finished(StoryOutcome::Cancelled)),
    };
    Ok(StepResult::Next(next))
}

fn upload(
    repository: &Repository,
    code: &TransferCode,
    state: &StoryState,
    context: &SyncContext<'_>,
) -> SyncResult<()> {
    let (client, credentials) = cloud_client(state, context)?;
    let data = encrypt_repository(repository, code, context.cryptor)?;
    client.upload(&credentials, &data)?;
    info!(bytes = data.len(), "uploaded repository");
    Ok(())
}

fn announce_success(context: &SyncContext<'_>, mode: StoryMode) {
    if mode.contains(StoryMode::TOASTS) {
        context.interaction.show_toast("Synchronization successful");
    }
}

fn store_merged_repository(
    state: &StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let cloud = cloud_repository(state)?;
    let code = state
        .working_code
        .as_ref()
        .ok_or(SyncError::DecryptionFailed)?;

    // The user may have edited notes while the download was running.
    let (local, _) = context.storage.reload()?;
    let (merged, report) = merge_with_report(&local, cloud);
    let merged_fingerprint = merged.fingerprint();

    let local_changed = merged_fingerprint != local.fingerprint();
    if local_changed {
        context.storage.save(&merged)?;
    }
    let uploaded = merged_fingerprint != cloud.fingerprint();
    if uploaded {
        upload(&merged, code, state, context)?;
    }

    info!(local_changed, uploaded, ?report, "stored merged repository");
    announce_success(context, mode);
    Ok(StepResult::Finished(StoryOutcome::Stored {
        local_changed,
        uploaded,
    }))
}

fn store_local_repository_to_cloud(
    state: &mut StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let local = context.storage.load()?;

    let code = match state
        .working_code
        .clone()
        .or_else(|| state.settings.transfer_code.clone())
    {
        Some(code) => code,
        None => {
            let code = TransferCode::generate(&mut rand::thread_rng());
            state
                .settings
                .set_transfer_code(code.clone(), context.config.transfer_code_history_limit);
            context.settings.save(&state.settings)?;
            info!("generated new transfer code");
            if mode.contains(StoryMode::DIALOGS) {
                context.interaction.show_transfer_code(&code);
            }
            code
        }
    };

    upload(&local, &code, state, context)?;
    announce_success(context, mode);
    Ok(StepResult::Finished(StoryOutcome::Stored {
        local_changed: false,
        uploaded: true,
    }))
}

fn store_cloud_repository_to_device(
    state: &StoryState,
    context: &SyncContext<'_>,
    mode: StoryMode,
) -> SyncResult<StepResult> {
    let cloud = cloud_repository(state)?;
    let local = context.storage.load()?;
    let local_changed = local.fingerprint() != cloud.fingerprint();

    context.storage.save(cloud)?;
    info!(repository = %cloud.id, "replaced local repository with cloud copy");
    announce_success(context, mode);
    Ok(StepResult::Finished(StoryOutcome::Stored {
        local_changed,
        uploaded: false,
    }))
}
