//! Cheap change detection for repositories.
//!
//! The fingerprint folds every clock of a repository into a single `i64`.
//! Equal fingerprints mean no reconciliation is needed; different
//! fingerprints only suggest that something changed. Collisions are
//! acceptable because the value short-circuits work, it never decides
//! which data survives.
//!
//! The combination is order sensitive: reordering notes changes the value.

use crate::model::Repository;
use crate::types::Timestamp;
use sha2::{Digest, Sha256};

/// Computes the fingerprint of a repository.
///
/// Input, in order: `{id, revision, order_modified_at}`, every note's
/// `{modified_at, meta_modified_at?, in_recycle_bin}`, every tombstone id,
/// every safe's `{modified_at, maintained_at?}`.
#[must_use]
pub fn fingerprint(repository: &Repository) -> i64 {
    let mut hasher = Sha256::new();

    hasher.update(repository.id.as_bytes());
    hasher.update(repository.revision.to_le_bytes());
    update_timestamp(&mut hasher, repository.order_modified_at);

    for note in &repository.notes {
        update_timestamp(&mut hasher, note.modified_at);
        update_optional_timestamp(&mut hasher, note.meta_modified_at());
        hasher.update([u8::from(note.in_recycle_bin)]);
    }

    for deleted in &repository.deleted_notes {
        hasher.update(deleted.id.as_bytes());
    }

    for safe in &repository.safes {
        update_timestamp(&mut hasher, safe.modified_at);
        update_optional_timestamp(&mut hasher, safe.maintained_at());
    }

    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    i64::from_le_bytes(head)
}

fn update_timestamp(hasher: &mut Sha256, timestamp: Timestamp) {
    hasher.update(timestamp.timestamp_millis().to_le_bytes());
}

fn update_optional_timestamp(hasher: &mut Sha256, timestamp: Option<Timestamp>) {
    match timestamp {
        Some(timestamp) => {
            hasher.update([1]);
            update_timestamp(hasher, timestamp);
        }
        None => hasher.update([0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeletedNote, Note, Safe};
    use chrono::TimeDelta;
    use uuid::Uuid;

    fn sample() -> Repository {
        let mut repository = Repository::new();
        repository.notes.push(Note::new());
        repository.notes.push(Note::new());
        repository
            .deleted_notes
            .push(DeletedNote::new(Uuid::new_v4(), crate::types::now()));
        repository.safes.push(Safe::new(vec![1, 2, 3]));
        repository
    }

    #[test]
    fn deterministic() {
        let repository = sample();
        assert_eq!(fingerprint(&repository), fingerprint(&repository));
        assert_eq!(fingerprint(&repository), fingerprint(&repository.clone()));
    }

    #[test]
    fn note_content_clock_changes_fingerprint() {
        let mut repository = sample();
        let before = fingerprint(&repository);
        repository.notes[1].modified_at += TimeDelta::seconds(1);
        assert_ne!(before, fingerprint(&repository));
    }

    #[test]
    fn recycle_bin_flag_changes_fingerprint() {
        let mut repository = sample();
        let before = fingerprint(&repository);
        repository.notes[0].in_recycle_bin = true;
        assert_ne!(before, fingerprint(&repository));
    }

    #[test]
    fn tombstones_and_safes_change_fingerprint() {
        let mut repository = sample();
        let before = fingerprint(&repository);
        repository
            .deleted_notes
            .push(DeletedNote::new(Uuid::new_v4(), crate::types::now()));
        let with_tombstone = fingerprint(&repository);
        assert_ne!(before, with_tombstone);

        repository.safes[0].modified_at -= TimeDelta::seconds(10);
        repository.safes[0].touch_maintained();
        assert_ne!(with_tombstone, fingerprint(&repository));
    }

    #[test]
    fn body_is_not_part_of_fingerprint() {
        let mut repository = sample();
        let before = fingerprint(&repository);
        repository.notes[0].body = "edited without touching the clock".into();
        assert_eq!(before, fingerprint(&repository));
    }

    #[test]
    fn note_order_changes_fingerprint() {
        let mut repository = sample();
        repository.notes[1].modified_at += TimeDelta::seconds(5);
        let before = fingerprint(&repository);
        repository.notes.swap(0, 1);
        assert_ne!(before, fingerprint(&repository));
    }
}
