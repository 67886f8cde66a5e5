//! Timestamp based merge of two repository replicas.
//!
//! The merge works per entity, never per document:
//!
//! - Notes are united by id. For notes on both sides the newer content
//!   clock wins the content wholesale, while the tag clock independently
//!   decides which side's tags survive.
//! - Tombstones are united (latest deletion time wins) and remove the live
//!   note from the result, whatever its clocks say. A deletion made on one
//!   device therefore eventually wins over an unsynced edit on another.
//! - Safes are united by id; the user clock chooses the surviving key after
//!   stale housekeeping clocks are discarded.
//! - The note order is taken wholesale from the side whose order clock is
//!   newer. Two independent reorderings cannot be interleaved meaningfully.
//!   Equal order clocks pick the side whose note id sequence sorts first.
//!
//! The result never depends on which replica is local, except for the
//! repository id and for entity ties, which keep the local entity. Tombstones
//! and safes are emitted sorted by id so replicas converge on one fingerprint.

use crate::model::{Note, Repository, Safe};
use crate::types::NEWEST_SUPPORTED_REVISION;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Counters describing what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Notes only present on one side.
    pub notes_taken_from_one_side: usize,
    /// Notes present on both sides whose content came from the remote side.
    pub notes_updated_from_remote: usize,
    /// Notes whose tags came from the other side than their content.
    pub notes_with_foreign_tags: usize,
    /// Live notes dropped because of a tombstone.
    pub notes_removed_by_tombstone: usize,
    /// Safes present on both sides whose key came from the remote side.
    pub safes_updated_from_remote: usize,
}

/// Merges two replicas of a repository. See the module documentation.
#[must_use]
pub fn merge(local: &Repository, remote: &Repository) -> Repository {
    merge_with_report(local, remote).0
}

/// Merges two replicas and reports what changed.
#[must_use]
pub fn merge_with_report(local: &Repository, remote: &Repository) -> (Repository, MergeReport) {
    let mut report = MergeReport::default();

    let (ordered, other) = order_source(local, remote);

    let mut result = Repository {
        id: local.id,
        revision: NEWEST_SUPPORTED_REVISION,
        order_modified_at: ordered.order_modified_at,
        notes: Vec::with_capacity(local.notes.len().max(remote.notes.len())),
        deleted_notes: Vec::new(),
        safes: Vec::new(),
    };

    for tombstone in local.deleted_notes.iter().chain(&remote.deleted_notes) {
        result.add_tombstone(*tombstone);
    }
    let tombstoned: HashSet<Uuid> = result.deleted_notes.iter().map(|t| t.id).collect();

    let ordered_ids: HashSet<Uuid> = ordered.notes.iter().map(|note| note.id).collect();
    let note_ids = ordered
        .notes
        .iter()
        .chain(other.notes.iter().filter(|note| !ordered_ids.contains(&note.id)))
        .map(|note| note.id);

    for id in note_ids {
        if tombstoned.contains(&id) {
            report.notes_removed_by_tombstone += 1;
            continue;
        }
        let merged = match (local.find_note(id), remote.find_note(id)) {
            (Some(local_note), Some(remote_note)) => merge_note(local_note, remote_note, &mut report),
            (Some(note), None) | (None, Some(note)) => {
                report.notes_taken_from_one_side += 1;
                let mut note = note.clone();
                note.normalize();
                note
            }
            (None, None) => continue,
        };
        result.notes.push(merged);
    }

    let mut safe_ids: Vec<Uuid> = local
        .safes
        .iter()
        .chain(&remote.safes)
        .map(|safe| safe.id)
        .collect();
    safe_ids.sort_unstable();
    safe_ids.dedup();

    for id in safe_ids {
        let merged = match (local.find_safe(id), remote.find_safe(id)) {
            (Some(local_safe), Some(remote_safe)) => merge_safe(local_safe, remote_safe, &mut report),
            (Some(safe), None) | (None, Some(safe)) => {
                let mut safe = safe.clone();
                safe.normalize();
                safe
            }
            (None, None) => continue,
        };
        result.safes.push(merged);
    }

    debug!(
        notes = result.notes.len(),
        tombstones = result.deleted_notes.len(),
        safes = result.safes.len(),
        ?report,
        "merged repositories"
    );
    (result, report)
}

/// Returns `(ordered, other)`: the replica supplying the note order first.
fn order_source<'a>(
    local: &'a Repository,
    remote: &'a Repository,
) -> (&'a Repository, &'a Repository) {
    let remote_first = match remote.order_modified_at.cmp(&local.order_modified_at) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => remote
            .notes
            .iter()
            .map(|note| note.id)
            .lt(local.notes.iter().map(|note| note.id)),
    };
    if remote_first {
        (remote, local)
    } else {
        (local, remote)
    }
}

fn merge_note(local: &Note, remote: &Note, report: &mut MergeReport) -> Note {
    let remote_content_wins = remote.modified_at > local.modified_at;
    let remote_tags_win = remote.effective_meta_modified_at() > local.effective_meta_modified_at();

    let mut merged = if remote_content_wins {
        report.notes_updated_from_remote += 1;
        remote.clone()
    } else {
        local.clone()
    };
    merged.created_at = local.created_at;

    if remote_tags_win != remote_content_wins {
        report.notes_with_foreign_tags += 1;
    }
    merged.take_tags_from(if remote_tags_win { remote } else { local });
    merged.normalize();
    merged
}

fn merge_safe(local: &Safe, remote: &Safe, report: &mut MergeReport) -> Safe {
    let mut local = local.clone();
    local.normalize();
    let mut remote = remote.clone();
    remote.normalize();

    let maintained_at = local.maintained_at().max(remote.maintained_at());
    let mut merged = if remote.modified_at > local.modified_at {
        report.safes_updated_from_remote += 1;
        remote
    } else {
        local
    };
    merged.set_maintained_at(maintained_at);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeletedNote;
    use crate::types::Timestamp;

    fn ts(secs: i64) -> Timestamp {
        chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn note_at(secs: i64, body: &str) -> Note {
        let mut note = Note::with_timestamp(ts(secs));
        note.body = body.into();
        note
    }

    fn replica_of(repository: &Repository) -> Repository {
        repository.clone()
    }

    #[test]
    fn newer_remote_content_wins() {
        let mut local = Repository::new();
        let n1 = note_at(0, "original");
        local.notes.push(n1.clone());

        let mut remote = replica_of(&local);
        remote.notes[0].body = "edited on phone".into();
        remote.notes[0].modified_at = ts(1);

        let (merged, report) = merge_with_report(&local, &remote);
        let note = merged.find_note(n1.id).unwrap();
        assert_eq!(note.body, "edited on phone");
        assert_eq!(note.modified_at, ts(1));
        assert_eq!(report.notes_updated_from_remote, 1);
    }

    #[test]
    fn newer_local_content_wins() {
        let mut local = Repository::new();
        local.notes.push(note_at(5, "local edit"));
        let mut remote = replica_of(&local);
        remote.notes[0].body = "stale".into();
        remote.notes[0].modified_at = ts(1);

        let merged = merge(&local, &remote);
        assert_eq!(merged.notes[0].body, "local edit");
    }

    #[test]
    fn tag_rename_survives_losing_content() {
        let mut local = Repository::new();
        local.notes.push(note_at(0, "base"));
        let mut remote = replica_of(&local);

        // Local renames a tag at t=20, remote edits the body at t=10.
        local.notes[0].set_tags(["renamed"]);
        local.notes[0].set_meta_modified_at(Some(ts(20)));
        remote.notes[0].body = "newer body".into();
        remote.notes[0].modified_at = ts(10);

        let (merged, report) = merge_with_report(&local, &remote);
        let note = &merged.notes[0];
        assert_eq!(note.body, "newer body");
        assert_eq!(note.tags(), ["renamed"]);
        assert_eq!(note.meta_modified_at(), Some(ts(20)));
        assert_eq!(report.notes_with_foreign_tags, 1);
    }

    #[test]
    fn newer_content_keeps_its_tags_over_older_tag_change() {
        let mut local = Repository::new();
        local.notes.push(note_at(0, "base"));
        let mut remote = replica_of(&local);

        local.notes[0].set_tags(["old-rename"]);
        local.notes[0].set_meta_modified_at(Some(ts(5)));

        remote.notes[0].body = "edited later".into();
        remote.notes[0].modified_at = ts(30);

        let merged = merge(&local, &remote);
        assert_eq!(merged.notes[0].body, "edited later");
        assert!(merged.notes[0].tags().is_empty());
        assert_eq!(merged.notes[0].meta_modified_at(), None);
    }

    #[test]
    fn tombstone_removes_older_live_note() {
        let mut local = Repository::new();
        let n2 = note_at(0, "to be deleted");
        local.notes.push(n2.clone());
        let remote = replica_of(&local);

        local.notes.clear();
        local.deleted_notes.push(DeletedNote::new(n2.id, ts(5)));

        let (merged, report) = merge_with_report(&local, &remote);
        assert!(merged.find_note(n2.id).is_none());
        assert_eq!(merged.deleted_notes, vec![DeletedNote::new(n2.id, ts(5))]);
        assert_eq!(report.notes_removed_by_tombstone, 1);

        // Same result when the deletion arrives from the remote side.
        let merged = merge(&remote, &local);
        assert!(merged.find_note(n2.id).is_none());
        assert!(merged.contains_tombstone(n2.id));
    }

    #[test]
    fn tombstone_wins_over_unsynced_edit() {
        let mut local = Repository::new();
        let note = note_at(100, "edited after deletion elsewhere");
        local.notes.push(note.clone());

        let mut remote = Repository::new();
        remote.id = local.id;
        remote.deleted_notes.push(DeletedNote::new(note.id, ts(50)));

        let merged = merge(&local, &remote);
        assert!(merged.notes.is_empty());
        assert!(merged.contains_tombstone(note.id));
    }

    #[test]
    fn tombstones_keep_latest_deletion() {
        let id = Uuid::new_v4();
        let mut local = Repository::new();
        local.deleted_notes.push(DeletedNote::new(id, ts(1)));
        let mut remote = replica_of(&local);
        remote.deleted_notes[0].deleted_at = ts(9);

        let merged = merge(&local, &remote);
        assert_eq!(merged.deleted_notes, vec![DeletedNote::new(id, ts(9))]);
    }

    #[test]
    fn order_follows_newer_order_clock() {
        let mut local = Repository::new();
        local.order_modified_at = ts(0);
        let a = note_at(0, "a");
        let b = note_at(0, "b");
        local.notes = vec![a.clone(), b.clone()];

        let mut remote = replica_of(&local);
        remote.notes.reverse();
        remote.order_modified_at = ts(10);
        let c = note_at(3, "c");
        local.notes.push(c.clone());

        let merged = merge(&local, &remote);
        let ids: Vec<Uuid> = merged.notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b.id, a.id, c.id]);
        assert_eq!(merged.order_modified_at, ts(10));
    }

    #[test]
    fn safes_choose_key_by_user_clock() {
        let mut local_safe = Safe::new(vec![1]);
        local_safe.modified_at = ts(0);
        let mut remote_safe = local_safe.clone();
        remote_safe.encrypted_key = vec![2];
        remote_safe.modified_at = ts(10);
        // Housekeeping on the local side happened before the remote password change.
        local_safe.set_maintained_at(Some(ts(5)));

        let mut local = Repository::new();
        local.safes.push(local_safe);
        let mut remote = replica_of(&local);
        remote.safes = vec![remote_safe];

        let (merged, report) = merge_with_report(&local, &remote);
        assert_eq!(merged.safes.len(), 1);
        assert_eq!(merged.safes[0].encrypted_key, vec![2]);
        assert_eq!(merged.safes[0].maintained_at(), None);
        assert_eq!(report.safes_updated_from_remote, 1);
    }

    #[test]
    fn housekeeping_never_outranks_password_change() {
        let mut local_safe = Safe::new(vec![1]);
        local_safe.modified_at = ts(0);
        let mut remote_safe = local_safe.clone();
        remote_safe.encrypted_key = vec![2];
        remote_safe.modified_at = ts(10);
        local_safe.set_maintained_at(Some(ts(50)));

        let mut local = Repository::new();
        local.safes.push(local_safe);
        let mut remote = replica_of(&local);
        remote.safes = vec![remote_safe];

        let merged = merge(&local, &remote);
        assert_eq!(merged.safes[0].encrypted_key, vec![2]);
        assert_eq!(merged.safes[0].maintained_at(), Some(ts(50)));
    }

    #[test]
    fn safes_are_united() {
        let mut local = Repository::new();
        local.safes.push(Safe::new(vec![1]));
        let mut remote = replica_of(&local);
        remote.safes.push(Safe::new(vec![2]));

        let merged = merge(&local, &remote);
        assert_eq!(merged.safes.len(), 2);
    }

    #[test]
    fn result_has_newest_revision() {
        let mut local = Repository::new();
        local.revision = 1;
        let remote = replica_of(&local);
        assert_eq!(merge(&local, &remote).revision, NEWEST_SUPPORTED_REVISION);
    }

    #[test]
    fn disjoint_notes_merge_symmetrically() {
        let mut local = Repository::new();
        local.order_modified_at = ts(0);
        local.notes.push(note_at(1, "left"));
        let mut remote = Repository::new();
        remote.id = local.id;
        remote.order_modified_at = ts(0);
        remote.notes.push(note_at(2, "right"));

        let lr = merge(&local, &remote);
        let rl = merge(&remote, &local);
        assert_eq!(lr, rl);
        assert_eq!(lr.notes.len(), 2);
    }

    #[test]
    fn tied_order_clocks_pick_the_same_order_on_both_sides() {
        let mut local = Repository::new();
        local.order_modified_at = ts(0);
        local.notes = vec![note_at(0, "a"), note_at(0, "b"), note_at(0, "c")];
        let mut remote = replica_of(&local);
        remote.notes.reverse();

        let lr = merge(&local, &remote);
        let rl = merge(&remote, &local);
        assert_eq!(lr.notes, rl.notes);
        assert_eq!(lr.fingerprint(), rl.fingerprint());
    }

    #[test]
    fn tombstones_and_safes_are_sorted_by_id() {
        let mut local = Repository::new();
        let mut remote = replica_of(&local);
        for _ in 0..3 {
            local.deleted_notes.push(DeletedNote::new(Uuid::new_v4(), ts(1)));
            remote.deleted_notes.push(DeletedNote::new(Uuid::new_v4(), ts(2)));
            local.safes.push(Safe::new(vec![1]));
            remote.safes.push(Safe::new(vec![2]));
        }

        let lr = merge(&local, &remote);
        let rl = merge(&remote, &local);
        assert!(lr.deleted_notes.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert!(lr.safes.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert_eq!(lr.deleted_notes, rl.deleted_notes);
        assert_eq!(lr.safes, rl.safes);
        assert_eq!(lr.fingerprint(), rl.fingerprint());
    }
}
