//! The note repository.

use super::{DeletedNote, Note, NoteType, Safe};
use crate::fingerprint;
use crate::types::{now, Timestamp, NEWEST_SUPPORTED_REVISION};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// All notes, tombstones and safes of one user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository id, shared by all replicas of the same repository.
    pub id: Uuid,
    /// Document schema revision.
    pub revision: u32,
    /// Clock of the last change to the note order.
    pub order_modified_at: Timestamp,
    /// Notes in display order.
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Tombstones of erased notes.
    #[serde(default)]
    pub deleted_notes: Vec<DeletedNote>,
    /// Safes holding the keys of encrypted notes.
    #[serde(default)]
    pub safes: Vec<Safe>,
}

impl Repository {
    /// Creates an empty repository with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: NEWEST_SUPPORTED_REVISION,
            order_modified_at: now(),
            notes: Vec::new(),
            deleted_notes: Vec::new(),
            safes: Vec::new(),
        }
    }

    /// Creates the repository of a fresh install, seeded with welcome notes.
    #[must_use]
    pub fn with_sample_notes() -> Self {
        let mut repository = Self::new();

        let mut welcome = Note::new();
        welcome.body = "Welcome to NoteSync. Your notes are stored on this device and \
                        can be synchronized with a cloud storage of your choice."
            .into();
        welcome.is_pinned = true;
        repository.notes.push(welcome);

        let mut checklist = Note::new();
        checklist.note_type = NoteType::Checklist;
        checklist.body = "[ ] Configure a cloud storage\n[ ] Create a safe for private notes".into();
        repository.notes.push(checklist);

        repository
    }

    /// Computes the change fingerprint. See [`fingerprint::fingerprint`].
    #[must_use]
    pub fn fingerprint(&self) -> i64 {
        fingerprint::fingerprint(self)
    }

    /// Finds a live note by id.
    #[must_use]
    pub fn find_note(&self, id: Uuid) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    /// Finds a live note by id for modification.
    pub fn find_note_mut(&mut self, id: Uuid) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| note.id == id)
    }

    /// Finds a safe by id.
    #[must_use]
    pub fn find_safe(&self, id: Uuid) -> Option<&Safe> {
        self.safes.iter().find(|safe| safe.id == id)
    }

    /// Finds a safe by id for modification.
    pub fn find_safe_mut(&mut self, id: Uuid) -> Option<&mut Safe> {
        self.safes.iter_mut().find(|safe| safe.id == id)
    }

    /// Returns true if the note id was erased.
    #[must_use]
    pub fn contains_tombstone(&self, id: Uuid) -> bool {
        self.deleted_notes.iter().any(|deleted| deleted.id == id)
    }

    /// Stamps the note-order clock after the user reordered notes.
    pub fn refresh_order_modified_at(&mut self) {
        self.order_modified_at = now();
    }

    /// Erases a note and records its tombstone.
    ///
    /// Returns the removed note, if it existed.
    pub fn delete_note_permanently(&mut self, id: Uuid) -> Option<Note> {
        let position = self.notes.iter().position(|note| note.id == id)?;
        let note = self.notes.remove(position);
        self.add_tombstone(DeletedNote::new(id, now()));
        Some(note)
    }

    /// Erases every note in the recycle bin. Returns the number erased.
    pub fn empty_recycle_bin(&mut self) -> usize {
        let recycled: Vec<Uuid> = self
            .notes
            .iter()
            .filter(|note| note.in_recycle_bin)
            .map(|note| note.id)
            .collect();
        for id in &recycled {
            self.delete_note_permanently(*id);
        }
        recycled.len()
    }

    /// Removes all safes and erases every note encrypted by one of them.
    ///
    /// This is the only way safes disappear. The erased notes become
    /// tombstones so no orphaned ciphertext is left behind.
    pub fn reset_safes(&mut self) -> usize {
        let locked: Vec<Uuid> = self
            .notes
            .iter()
            .filter(|note| note.is_locked())
            .map(|note| note.id)
            .collect();
        for id in &locked {
            self.delete_note_permanently(*id);
        }
        self.safes.clear();
        locked.len()
    }

    /// Drops safes which no note references any more.
    pub fn remove_unused_safes(&mut self) -> usize {
        let used: HashSet<Uuid> = self.notes.iter().filter_map(|note| note.safe_id).collect();
        let before = self.safes.len();
        self.safes.retain(|safe| used.contains(&safe.id));
        before - self.safes.len()
    }

    /// Re-establishes the invariants of a loaded or merged repository.
    ///
    /// A nil id is replaced, tag clocks and housekeeping clocks that do not
    /// postdate their user clocks are cleared, and tombstones are
    /// deduplicated keeping the latest deletion time. Tombstones and safes
    /// are kept sorted by id.
    pub fn normalize(&mut self) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        for note in &mut self.notes {
            note.normalize();
        }
        for safe in &mut self.safes {
            safe.normalize();
        }
        self.safes.sort_by_key(|safe| safe.id);
        let tombstones = std::mem::take(&mut self.deleted_notes);
        for tombstone in tombstones {
            self.add_tombstone(tombstone);
        }
    }

    pub(crate) fn add_tombstone(&mut self, tombstone: DeletedNote) {
        match self
            .deleted_notes
            .binary_search_by_key(&tombstone.id, |existing| existing.id)
        {
            Ok(index) => {
                let existing = &mut self.deleted_notes[index];
                if tombstone.deleted_at > existing.deleted_at {
                    existing.deleted_at = tombstone.deleted_at;
                }
            }
            Err(index) => self.deleted_notes.insert(index, tombstone),
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_repository_has_id() {
        let repository = Repository::new();
        assert!(!repository.id.is_nil());
        assert_eq!(repository.revision, NEWEST_SUPPORTED_REVISION);
        assert!(Repository::with_sample_notes().notes.len() >= 2);
    }

    #[test]
    fn normalize_replaces_nil_id() {
        let mut repository = Repository::new();
        repository.id = Uuid::nil();
        repository.normalize();
        assert!(!repository.id.is_nil());
    }

    #[test]
    fn delete_note_creates_tombstone() {
        let mut repository = Repository::with_sample_notes();
        let id = repository.notes[0].id;

        assert!(repository.delete_note_permanently(id).is_some());
        assert!(repository.find_note(id).is_none());
        assert!(repository.contains_tombstone(id));
        assert!(repository.delete_note_permanently(id).is_none());
    }

    #[test]
    fn empty_recycle_bin_only_erases_recycled() {
        let mut repository = Repository::new();
        let mut recycled = Note::new();
        recycled.in_recycle_bin = true;
        let recycled_id = recycled.id;
        repository.notes.push(recycled);
        repository.notes.push(Note::new());

        assert_eq!(repository.empty_recycle_bin(), 1);
        assert_eq!(repository.notes.len(), 1);
        assert!(repository.contains_tombstone(recycled_id));
    }

    #[test]
    fn reset_safes_turns_locked_notes_into_tombstones() {
        let mut repository = Repository::new();
        let safe = Safe::new(vec![7; 60]);
        let mut locked = Note::new();
        locked.safe_id = Some(safe.id);
        let locked_id = locked.id;
        repository.safes.push(safe);
        repository.notes.push(locked);
        repository.notes.push(Note::new());

        assert_eq!(repository.reset_safes(), 1);
        assert!(repository.safes.is_empty());
        assert_eq!(repository.notes.len(), 1);
        assert!(repository.contains_tombstone(locked_id));
    }

    #[test]
    fn unused_safes_are_removed() {
        let mut repository = Repository::new();
        let used = Safe::new(vec![1]);
        let mut note = Note::new();
        note.safe_id = Some(used.id);
        repository.notes.push(note);
        repository.safes.push(used);
        repository.safes.push(Safe::new(vec![2]));

        assert_eq!(repository.remove_unused_safes(), 1);
        assert_eq!(repository.safes.len(), 1);
    }

    #[test]
    fn duplicate_tombstones_keep_latest() {
        let id = Uuid::new_v4();
        let early = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let late = chrono::DateTime::from_timestamp(1_700_000_100, 0).unwrap();

        let mut repository = Repository::new();
        repository.deleted_notes = vec![DeletedNote::new(id, early), DeletedNote::new(id, late)];
        repository.normalize();

        assert_eq!(repository.deleted_notes, vec![DeletedNote::new(id, late)]);
    }
}
