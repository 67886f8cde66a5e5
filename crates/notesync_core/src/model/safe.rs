//! Safes: password-protected key domains.

use crate::types::{base64_bytes, now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A password-protected symmetric key.
///
/// Notes referencing the safe by id store their body encrypted with the
/// safe's key. The key itself is stored encrypted with the user's password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safe {
    /// Unique safe id.
    pub id: Uuid,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the last user change (creation or password change).
    pub modified_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maintained_at: Option<Timestamp>,
    /// The symmetric key, encrypted with the password.
    #[serde(with = "base64_bytes")]
    pub encrypted_key: Vec<u8>,
}

impl Safe {
    /// Creates a safe around an already encrypted key.
    #[must_use]
    pub fn new(encrypted_key: Vec<u8>) -> Self {
        let timestamp = now();
        Self {
            id: Uuid::new_v4(),
            created_at: timestamp,
            modified_at: timestamp,
            maintained_at: None,
            encrypted_key,
        }
    }

    /// Returns the housekeeping clock, if it is newer than the user clock.
    #[must_use]
    pub fn maintained_at(&self) -> Option<Timestamp> {
        self.maintained_at
    }

    /// Sets the housekeeping clock. Values before `modified_at` are dropped.
    pub fn set_maintained_at(&mut self, value: Option<Timestamp>) {
        self.maintained_at = value;
        self.normalize();
    }

    /// Records an engine-initiated housekeeping touch.
    pub fn touch_maintained(&mut self) {
        self.set_maintained_at(Some(now()));
    }

    /// Replaces the encrypted key and stamps the user clock.
    pub fn replace_encrypted_key(&mut self, encrypted_key: Vec<u8>) {
        self.encrypted_key = encrypted_key;
        self.modified_at = now();
        self.normalize();
    }

    /// Drops a housekeeping clock that precedes the user clock.
    pub fn normalize(&mut self) {
        if matches!(self.maintained_at, Some(maintained) if maintained < self.modified_at) {
            self.maintained_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn maintained_at_before_modified_is_discarded() {
        let mut safe = Safe::new(vec![1, 2, 3]);
        safe.modified_at = ts(10);

        safe.set_maintained_at(Some(ts(9)));
        assert_eq!(safe.maintained_at(), None);

        safe.set_maintained_at(Some(ts(12)));
        assert_eq!(safe.maintained_at(), Some(ts(12)));
    }

    #[test]
    fn password_change_invalidates_older_maintenance() {
        let mut safe = Safe::new(vec![1]);
        safe.modified_at = ts(0);
        safe.set_maintained_at(Some(ts(5)));

        safe.replace_encrypted_key(vec![2]);
        assert_eq!(safe.maintained_at(), None);
        assert_eq!(safe.encrypted_key, vec![2]);
    }

    #[test]
    fn encrypted_key_serializes_as_base64() {
        let safe = Safe::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&safe).unwrap();
        assert!(json.contains("\"3q2+7w==\""));

        let decoded: Safe = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, safe);
    }
}
