//! # NoteSync Sync Engine
//!
//! Synchronization of a local note repository with a dumb cloud location.
//!
//! This crate provides:
//! - Single-flight guard (idle → running → idle, parked for authorization)
//! - The synchronization story: a chain of steps deciding pull, push or merge
//! - Cloud storage abstraction with folder and in-memory clients
//! - Transfer codes encrypting the cloud copy
//! - Persisted sync settings
//!
//! ## Architecture
//!
//! The cloud location stores one encrypted blob and has no logic of its own.
//! A synchronization downloads it, decrypts it with the transfer code,
//! merges it with the local repository and uploads the result if it
//! differs:
//! 1. Download and decrypt the cloud copy
//! 2. Compare fingerprints, stop if nothing changed
//! 3. Merge, store locally, upload
//!
//! ## Key Invariants
//!
//! - At most one synchronization runs at a time, extra attempts are rejected
//! - Nothing is written before the final step, failures leave no partial merge
//! - Silent runs never ask the user anything
//! - Network calls are never retried within a run

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cloud;
mod cloud_document;
mod config;
mod error;
mod guard;
mod interaction;
mod service;
mod settings;
mod story;
mod transfer_code;

pub use cloud::{
    CloudCredentials, CloudStorage, CloudStorageFactory, CloudStorageRegistry,
    FolderCloudStorage, MemoryCloudStorage, CLOUD_FILE_NAME, FOLDER_PROVIDER,
};
pub use cloud_document::{decrypt_repository, encrypt_repository};
pub use config::{SyncConfig, DEFAULT_TRANSFER_CODE_HISTORY_LIMIT};
pub use error::{CloudResult, CloudStorageError, SyncError, SyncResult};
pub use guard::{SyncState, SyncStateEvent, SyncStateGuard, SyncTrigger};
pub use interaction::{Interaction, MergeChoice, SilentInteraction};
pub use service::{SyncReport, SyncService};
pub use settings::{
    settings_file_name, FileSettingsStore, MemorySettingsStore, SettingsStore, SyncSettings,
    DEV_SETTINGS_FILE_NAME, SETTINGS_FILE_NAME,
};
pub use story::{run_step, run_story, StepId, StepResult, StoryMode, StoryOutcome, StoryState, SyncContext};
pub use transfer_code::{TransferCode, TRANSFER_CODE_ALPHABET, TRANSFER_CODE_LENGTH};
