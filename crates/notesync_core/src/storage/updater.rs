//! Upgrades of older repository documents.
//!
//! Updaters work on the raw JSON value before it is deserialized, so the
//! model types only ever describe the newest revision.

use crate::error::{CoreError, CoreResult};
use crate::types::{now, NEWEST_SUPPORTED_REVISION};
use serde_json::{json, Value};
use tracing::info;

/// Brings a raw repository document up to the newest revision.
pub trait RepositoryUpdater: Send + Sync {
    /// Upgrades the document in place.
    ///
    /// Returns true if the document was changed.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedRevision` for documents written by a newer engine.
    fn update(&self, document: &mut Value) -> CoreResult<bool>;
}

/// Reads the revision of a raw document. Documents without one are revision 1.
pub fn document_revision(document: &Value) -> CoreResult<u32> {
    match document.get("revision") {
        None | Some(Value::Null) => Ok(1),
        Some(value) => value
            .as_u64()
            .and_then(|revision| u32::try_from(revision).ok())
            .ok_or_else(|| CoreError::invalid_repository("revision is not a number")),
    }
}

/// The updater shipped with the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRepositoryUpdater;

impl DefaultRepositoryUpdater {
    /// Revision 1 → 2: adds the safe list and the note-order clock.
    fn update_to_revision_2(document: &mut serde_json::Map<String, Value>) {
        document
            .entry("safes")
            .or_insert_with(|| Value::Array(Vec::new()));

        if !document.contains_key("order_modified_at") {
            // The newest note clock is the best guess for the last reorder.
            let newest_note = document
                .get("notes")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|note| note.get("modified_at").and_then(Value::as_str))
                .filter_map(|text| chrono::DateTime::parse_from_rfc3339(text).ok())
                .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
                .max();
            document.insert(
                "order_modified_at".into(),
                json!(newest_note.unwrap_or_else(now)),
            );
        }
        document.insert("revision".into(), json!(2));
    }
}

impl RepositoryUpdater for DefaultRepositoryUpdater {
    fn update(&self, document: &mut Value) -> CoreResult<bool> {
        let revision = document_revision(document)?;
        if revision > NEWEST_SUPPORTED_REVISION {
            return Err(CoreError::unsupported_revision(
                revision,
                NEWEST_SUPPORTED_REVISION,
            ));
        }
        if revision == NEWEST_SUPPORTED_REVISION {
            return Ok(false);
        }

        let map = document
            .as_object_mut()
            .ok_or_else(|| CoreError::invalid_repository("document is not an object"))?;

        if revision < 2 {
            Self::update_to_revision_2(map);
        }

        info!(from = revision, to = NEWEST_SUPPORTED_REVISION, "upgraded repository document");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_revision_is_untouched() {
        let mut document = json!({ "revision": NEWEST_SUPPORTED_REVISION, "safes": [] });
        let before = document.clone();
        assert!(!DefaultRepositoryUpdater.update(&mut document).unwrap());
        assert_eq!(document, before);
    }

    #[test]
    fn revision_one_gains_safes_and_order_clock() {
        let mut document = json!({
            "id": "6f0e1c4b-8f57-4a55-9d39-2d3f0b6b1a11",
            "notes": [
                { "modified_at": "2024-01-01T00:00:00Z" },
                { "modified_at": "2024-03-01T00:00:00Z" }
            ]
        });
        assert!(DefaultRepositoryUpdater.update(&mut document).unwrap());
        assert_eq!(document["revision"], json!(2));
        assert_eq!(document["safes"], json!([]));
        assert_eq!(document["order_modified_at"], json!("2024-03-01T00:00:00Z"));
    }

    #[test]
    fn newer_revision_is_refused() {
        let mut document = json!({ "revision": NEWEST_SUPPORTED_REVISION + 1 });
        let result = DefaultRepositoryUpdater.update(&mut document);
        assert!(matches!(result, Err(CoreError::UnsupportedRevision { .. })));
    }

    #[test]
    fn non_numeric_revision_is_invalid() {
        let document = json!({ "revision": "two" });
        assert!(document_revision(&document).unwrap_err().is_invalid_repository());
    }
}
