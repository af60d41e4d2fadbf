// Domain models shared by the local store, the reconciler and the library client.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_segment_index() -> i64 {
    -1
}

/// Per-item reading state as persisted locally and mirrored into the remote
/// library. `is_completed` is derived by the caller (all segments observed
/// complete) and trusted as given; the store never re-validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default)]
    pub item_id: String,
    /// Segment ids the reader has marked as read. Unique, order irrelevant.
    #[serde(rename = "completed", default)]
    pub completed_segment_ids: BTreeSet<String>,
    /// Highest segment index opened so far; -1 means none opened yet.
    #[serde(default = "default_segment_index")]
    pub last_segment_index: i64,
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub total_segments: Option<i64>,
}

impl ProgressRecord {
    pub fn new(item_id: impl Into<String>) -> Self {
        ProgressRecord {
            item_id: item_id.into(),
            completed_segment_ids: BTreeSet::new(),
            last_segment_index: -1,
            last_read_at: None,
            is_completed: false,
            total_segments: None,
        }
    }
}

/// One remote library row, keyed by (user, content item) on the service side.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryRow {
    pub content_id: String,
    pub is_bookmarked: bool,
    pub progress: Option<ProgressRecord>,
    pub last_interacted_at: Option<DateTime<Utc>>,
}

/// Progress field of an upsert: either a full overwrite or an explicit clear.
/// "Leave untouched" is expressed by omitting the field on [`LibraryUpsert`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressPatch {
    Set(ProgressRecord),
    Clear,
}

/// Partial update for a remote library row. Fields left as `None` must not
/// overwrite existing remote values.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryUpsert {
    pub content_id: String,
    pub is_bookmarked: Option<bool>,
    pub progress: Option<ProgressPatch>,
    pub last_interacted_at: DateTime<Utc>,
}

impl LibraryUpsert {
    /// Progress-only overwrite. Carries the record's own mutation time so a
    /// later sync compares against the true local timestamp.
    pub fn set_progress(record: ProgressRecord) -> Self {
        LibraryUpsert {
            content_id: record.item_id.clone(),
            is_bookmarked: None,
            last_interacted_at: record.last_read_at.unwrap_or_else(Utc::now),
            progress: Some(ProgressPatch::Set(record)),
        }
    }

    pub fn clear_progress(content_id: impl Into<String>) -> Self {
        LibraryUpsert {
            content_id: content_id.into(),
            is_bookmarked: None,
            progress: Some(ProgressPatch::Clear),
            last_interacted_at: Utc::now(),
        }
    }

    /// Bookmark-only upsert; does not touch the progress field.
    pub fn bookmark(content_id: impl Into<String>, bookmarked: bool) -> Self {
        LibraryUpsert {
            content_id: content_id.into(),
            is_bookmarked: Some(bookmarked),
            progress: None,
            last_interacted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_progress_carries_local_timestamp() {
        let mut record = ProgressRecord::new("item-1");
        record.last_read_at = Some(Utc::now());
        let at = record.last_read_at;
        let upsert = LibraryUpsert::set_progress(record);
        assert_eq!(upsert.last_interacted_at, at.unwrap());
        assert!(upsert.is_bookmarked.is_none());
    }

    #[test]
    fn bookmark_upsert_leaves_progress_untouched() {
        let upsert = LibraryUpsert::bookmark("item-2", true);
        assert_eq!(upsert.is_bookmarked, Some(true));
        assert!(upsert.progress.is_none());
    }
}
