//! # NoteSync Core
//!
//! Repository model and reconciliation logic for NoteSync.
//!
//! This crate provides:
//! - The versioned repository model (notes, tombstones, safes)
//! - Change fingerprints for cheap "anything to do?" checks
//! - Timestamp based merge of two replicas with tombstone propagation
//! - The cryptor capability and the volatile safe key store
//! - File storage with shadow-file recovery and revision upgrades
//!
//! ## Key Invariants
//!
//! - A repository id is never nil
//! - Documents newer than [`NEWEST_SUPPORTED_REVISION`] are refused, never repaired
//! - A tombstone always removes the live note, on every replica
//! - Decrypted safe keys are never persisted

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
mod error;
mod fingerprint;
mod merge;
pub mod model;
mod safe_keys;
pub mod storage;
mod types;

pub use crypto::{AesGcmCryptor, CipherAlgorithm, Cryptor, EncryptionKey};
pub use error::{CoreError, CoreResult};
pub use fingerprint::fingerprint;
pub use merge::{merge, merge_with_report, MergeReport};
pub use model::{DeletedNote, Note, NoteType, Repository, Safe};
pub use safe_keys::SafeKeyStore;
pub use storage::{
    FileRepositoryStorage, LoadOutcome, MemoryRepositoryStorage, RepositoryStorage,
    StorageProfile,
};
pub use types::{now, Timestamp, NEWEST_SUPPORTED_REVISION};
