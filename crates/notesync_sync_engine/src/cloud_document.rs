//! The repository as stored in the cloud.
//!
//! The cloud copy is the regular repository document, encrypted with the
//! transfer code as key material.

use crate::error::{SyncError, SyncResult};
use crate::transfer_code::TransferCode;
use notesync_core::storage::{decode_document, encode_document, RepositoryUpdater};
use notesync_core::{CipherAlgorithm, CoreError, Cryptor, Repository};
use tracing::debug;

/// Encrypts a repository for upload.
pub fn encrypt_repository(
    repository: &Repository,
    code: &TransferCode,
    cryptor: &dyn Cryptor,
) -> SyncResult<Vec<u8>> {
    let document = encode_document(repository)?;
    let encrypted = cryptor.encrypt(
        &document,
        code.as_str().as_bytes(),
        CipherAlgorithm::default(),
        &mut rand::thread_rng(),
    )?;
    Ok(encrypted)
}

/// Decrypts and decodes a downloaded repository.
///
/// # Errors
///
/// - `DecryptionFailed` if `code` is not the code the blob was encrypted with
/// - `Core(InvalidRepository | UnsupportedRevision)` if the decrypted document
///   cannot be used
pub fn decrypt_repository(
    data: &[u8],
    code: &TransferCode,
    cryptor: &dyn Cryptor,
    updater: &dyn RepositoryUpdater,
) -> SyncResult<Repository> {
    let document = match cryptor.decrypt(data, code.as_str().as_bytes()) {
        Ok(document) => document,
        Err(CoreError::DecryptionFailed { message }) => {
            debug!(%message, "transfer code rejected");
            return Err(SyncError::DecryptionFailed);
        }
        Err(err) => return Err(err.into()),
    };
    Ok(decode_document(&document, updater)?.repository)
}
