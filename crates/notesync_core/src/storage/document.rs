//! Repository document encoding.

use super::updater::RepositoryUpdater;
use crate::error::{CoreError, CoreResult};
use crate::model::Repository;
use crate::types::NEWEST_SUPPORTED_REVISION;
use serde_json::Value;

/// A decoded repository and whether it had to be upgraded.
#[derive(Debug, Clone)]
pub struct DecodedRepository {
    /// The normalized repository.
    pub repository: Repository,
    /// True if the document was written by an older revision.
    pub upgraded: bool,
}

/// Decodes a repository document.
///
/// The raw document goes through the updater first, then is deserialized
/// and normalized.
///
/// # Errors
///
/// - `InvalidRepository` if the bytes are not a repository document
/// - `UnsupportedRevision` if the document is newer than this engine
pub fn decode_document(
    bytes: &[u8],
    updater: &dyn RepositoryUpdater,
) -> CoreResult<DecodedRepository> {
    let mut document: Value = serde_json::from_slice(bytes)
        .map_err(|err| CoreError::invalid_repository(format!("not a JSON document: {err}")))?;

    let upgraded = updater.update(&mut document)?;

    let mut repository: Repository = serde_json::from_value(document)
        .map_err(|err| CoreError::invalid_repository(format!("malformed repository: {err}")))?;

    if repository.revision > NEWEST_SUPPORTED_REVISION {
        return Err(CoreError::unsupported_revision(
            repository.revision,
            NEWEST_SUPPORTED_REVISION,
        ));
    }
    repository.normalize();

    Ok(DecodedRepository {
        repository,
        upgraded,
    })
}

/// Encodes a repository document.
///
/// # Errors
///
/// Refuses repositories claiming a revision this engine could not reload.
pub fn encode_document(repository: &Repository) -> CoreResult<Vec<u8>> {
    if repository.revision > NEWEST_SUPPORTED_REVISION {
        return Err(CoreError::unsupported_revision(
            repository.revision,
            NEWEST_SUPPORTED_REVISION,
        ));
    }
    Ok(serde_json::to_vec_pretty(repository)?)
}
