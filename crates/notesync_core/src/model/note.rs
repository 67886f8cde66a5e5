//! Notes and deleted-note tombstones.

use crate::types::{now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of content stored in a note body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    /// Free formatted text.
    #[default]
    Text,
    /// A list of items that can be checked off.
    Checklist,
}

/// A single note of the repository.
///
/// The note carries two clocks: `modified_at` tracks content changes and
/// `meta_modified_at` tracks tag changes only. Renaming a tag therefore does
/// not make a note look newer than one whose body actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique note id.
    pub id: Uuid,
    /// Kind of content.
    #[serde(default)]
    pub note_type: NoteType,
    /// Note content. Ciphertext when `safe_id` is set.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    tags: Vec<String>,
    /// Background color as a css-like color string.
    #[serde(default)]
    pub background_color: String,
    /// Whether the note sits in the recycle bin.
    #[serde(default)]
    pub in_recycle_bin: bool,
    /// Whether a checklist is shown in shopping mode.
    #[serde(default)]
    pub shopping_mode_active: bool,
    /// Whether the note is pinned to the top of the list.
    #[serde(default)]
    pub is_pinned: bool,
    /// Creation time, never changed after creation.
    pub created_at: Timestamp,
    /// Content clock.
    pub modified_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_modified_at: Option<Timestamp>,
    /// Safe whose key encrypts the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_id: Option<Uuid>,
}

impl Note {
    /// Creates an empty text note stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timestamp(now())
    }

    /// Creates an empty text note whose clocks are set to `timestamp`.
    #[must_use]
    pub fn with_timestamp(timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            note_type: NoteType::Text,
            body: String::new(),
            tags: Vec::new(),
            background_color: String::new(),
            in_recycle_bin: false,
            shopping_mode_active: false,
            is_pinned: false,
            created_at: timestamp,
            modified_at: timestamp,
            meta_modified_at: None,
            safe_id: None,
        }
    }

    /// Returns the tags in display order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the tag clock, if tags changed after the content.
    #[must_use]
    pub fn meta_modified_at(&self) -> Option<Timestamp> {
        self.meta_modified_at
    }

    /// Returns the clock deciding which side's tags survive a merge.
    #[must_use]
    pub fn effective_meta_modified_at(&self) -> Timestamp {
        self.meta_modified_at.unwrap_or(self.modified_at)
    }

    /// Returns true if the body is ciphertext of a safe.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.safe_id.is_some()
    }

    /// Sets the tag clock. Values not strictly after `modified_at` clear it.
    pub fn set_meta_modified_at(&mut self, value: Option<Timestamp>) {
        self.meta_modified_at = value;
        self.normalize_meta_modified_at();
    }

    /// Replaces the body and stamps the content clock.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
        self.refresh_modified_at();
    }

    /// Replaces all tags, dropping case-insensitive duplicates, and stamps
    /// the tag clock.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            self.push_unique_tag(tag.into());
        }
        self.refresh_meta_modified_at();
    }

    /// Adds a tag unless an equal tag (ignoring case) exists.
    ///
    /// Returns true if the tag was added.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let added = self.push_unique_tag(tag.into());
        if added {
            self.refresh_meta_modified_at();
        }
        added
    }

    /// Removes a tag, ignoring case. Returns true if a tag was removed.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| !eq_ignore_case(existing, tag));
        let removed = self.tags.len() != before;
        if removed {
            self.refresh_meta_modified_at();
        }
        removed
    }

    /// Returns true if the note carries the tag, ignoring case.
    #[must_use]
    pub fn contains_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| eq_ignore_case(existing, tag))
    }

    /// Stamps the content clock with the current time.
    pub fn refresh_modified_at(&mut self) {
        self.modified_at = now();
        self.normalize_meta_modified_at();
    }

    /// Stamps the tag clock with the current time.
    pub fn refresh_meta_modified_at(&mut self) {
        self.set_meta_modified_at(Some(now()));
    }

    /// Re-establishes the note invariants after loading or merging.
    pub fn normalize(&mut self) {
        self.normalize_meta_modified_at();
        let tags = std::mem::take(&mut self.tags);
        for tag in tags {
            self.push_unique_tag(tag);
        }
    }

    pub(crate) fn take_tags_from(&mut self, other: &Note) {
        self.tags = other.tags.clone();
        self.meta_modified_at = other.meta_modified_at;
        self.normalize_meta_modified_at();
    }

    fn normalize_meta_modified_at(&mut self) {
        if matches!(self.meta_modified_at, Some(meta) if meta <= self.modified_at) {
            self.meta_modified_at = None;
        }
    }

    fn push_unique_tag(&mut self, tag: String) -> bool {
        let tag = tag.trim().to_string();
        if tag.is_empty() || self.contains_tag(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Marker recording that a note was deliberately erased.
///
/// Tombstones are kept forever so that a stale replica cannot bring the
/// note back through synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletedNote {
    /// Id of the erased note.
    pub id: Uuid,
    /// When the note was erased.
    pub deleted_at: Timestamp,
}

impl DeletedNote {
    /// Creates a tombstone.
    #[must_use]
    pub fn new(id: Uuid, deleted_at: Timestamp) -> Self {
        Self { id, deleted_at }
    }
}
