//! Core type definitions for NoteSync.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Point in time used by every clock in the repository.
pub type Timestamp = DateTime<Utc>;

/// Newest repository revision this engine can read and write.
///
/// Revision history:
/// - 1: notes and tombstones only
/// - 2: safes and the note-order clock
pub const NEWEST_SUPPORTED_REVISION: u32 = 2;

/// Returns the current time truncated to whole milliseconds.
///
/// Documents store millisecond precision, so clocks taken here compare
/// equal after a save/load cycle.
#[must_use]
pub fn now() -> Timestamp {
    let now = Utc::now();
    now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now)
}

/// Serde adapter storing binary blobs as standard base64 text.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
