//! The book record model and its merge contracts.

use serde::{Deserialize, Serialize};

/// One library entry, local or remote.
///
/// `hash` is the stable content-derived identity; everything else is
/// descriptive or lifecycle metadata. Wire names are camelCase to match
/// the JSON protocol of the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    /// Content-derived identifier, unique within a library.
    pub hash: String,
    /// Display title.
    pub title: String,
    /// Display author.
    pub author: String,
    /// Title as found in the source file, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    /// Container format tag (epub, pdf, mobi, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Epoch millis of the last local or remote mutation.
    pub updated_at: i64,
    /// Tombstone marker; set when the record is soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    /// Set once the record has been accepted by the remote side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
    /// Set once a cover image has been hydrated locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_downloaded_at: Option<i64>,
    /// Local handle to hydrated cover art.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// Reading position, opaque to the merge engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<serde_json::Value>,
}

impl BookRecord {
    /// Create a minimal record as produced by a local import.
    pub fn new(
        hash: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        updated_at: i64,
    ) -> Self {
        Self {
            hash: hash.into(),
            title: title.into(),
            author: author.into(),
            source_title: None,
            format: None,
            updated_at,
            deleted_at: None,
            uploaded_at: None,
            cover_downloaded_at: None,
            cover_image_url: None,
            progress: None,
        }
    }

    /// Whether this record is a soft-deleted tombstone.
    ///
    /// Tombstones keep occupying a slot in the synchronized set so the
    /// deletion propagates to other devices; they are never cover-hydrated.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether this record carries mutations newer than the sync cursor.
    ///
    /// A tombstone's mutation is recorded in `deleted_at`, which may be set
    /// independently of `updated_at`, hence the double comparison.
    pub fn changed_since(&self, cursor: i64) -> bool {
        cursor < self.updated_at || cursor < self.deleted_at.unwrap_or(0)
    }

    /// Overlay `top` onto `base`.
    ///
    /// Required fields come from `top`; each optional field takes `top`'s
    /// value when present and falls back to `base`'s otherwise. This is the
    /// record-granular merge rule: the winner's fields always take
    /// precedence, the loser only supplies what the winner does not carry.
    pub fn overlay(base: &BookRecord, top: &BookRecord) -> BookRecord {
        BookRecord {
            hash: top.hash.clone(),
            title: top.title.clone(),
            author: top.author.clone(),
            source_title: top.source_title.clone().or_else(|| base.source_title.clone()),
            format: top.format.clone().or_else(|| base.format.clone()),
            updated_at: top.updated_at,
            deleted_at: top.deleted_at.or(base.deleted_at),
            uploaded_at: top.uploaded_at.or(base.uploaded_at),
            cover_downloaded_at: top.cover_downloaded_at.or(base.cover_downloaded_at),
            cover_image_url: top
                .cover_image_url
                .clone()
                .or_else(|| base.cover_image_url.clone()),
            progress: top.progress.clone().or_else(|| base.progress.clone()),
        }
    }

    /// Resolve two colliding records for the same `hash` by recency.
    ///
    /// The record with the strictly greater `updated_at` wins outright;
    /// on a tie the local record wins. Locally-only fields survive a
    /// remote win because the loser still serves as the overlay base.
    pub fn resolve(local: &BookRecord, synced: &BookRecord) -> BookRecord {
        if synced.updated_at > local.updated_at {
            Self::overlay(local, synced)
        } else {
            Self::overlay(synced, local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(hash: &str, updated_at: i64) -> BookRecord {
        BookRecord::new(hash, "Title", "Author", updated_at)
    }

    #[test]
    fn test_changed_since_uses_updated_at() {
        let cursor = 100;
        assert!(record("h", cursor + 1).changed_since(cursor));
        assert!(!record("h", cursor - 1).changed_since(cursor));
        assert!(!record("h", cursor).changed_since(cursor));
    }

    #[test]
    fn test_changed_since_considers_deleted_at_independently() {
        let cursor = 100;
        let mut tombstone = record("h", cursor - 1);
        tombstone.deleted_at = Some(cursor + 1);
        assert!(tombstone.changed_since(cursor));

        let mut old_tombstone = record("h", cursor - 1);
        old_tombstone.deleted_at = Some(cursor - 1);
        assert!(!old_tombstone.changed_since(cursor));
    }

    #[test]
    fn test_overlay_prefers_top_fields() {
        let mut base = record("h", 1);
        base.author = "Base Author".to_string();
        base.source_title = Some("base source".to_string());
        base.progress = Some(serde_json::json!({ "page": 3 }));

        let mut top = record("h", 2);
        top.author = "Top Author".to_string();
        top.source_title = Some("top source".to_string());

        let merged = BookRecord::overlay(&base, &top);
        assert_eq!(merged.updated_at, 2);
        assert_eq!(merged.author, "Top Author");
        assert_eq!(merged.source_title.as_deref(), Some("top source"));
        // Absent in top, supplied by base.
        assert_eq!(merged.progress, base.progress);
    }

    #[test]
    fn test_resolve_newer_synced_wins_but_keeps_local_extras() {
        let mut local = record("h", 10);
        local.cover_image_url = Some("file:///covers/h.jpg".to_string());

        let mut synced = record("h", 20);
        synced.title = "Remote Title".to_string();
        synced.uploaded_at = Some(21);

        let merged = BookRecord::resolve(&local, &synced);
        assert_eq!(merged.title, "Remote Title");
        assert_eq!(merged.updated_at, 20);
        // Local-only field survives the remote win.
        assert_eq!(merged.cover_image_url, local.cover_image_url);
        assert_eq!(merged.uploaded_at, Some(21));
    }

    #[test]
    fn test_resolve_local_wins_ties_and_newer() {
        let mut local = record("h", 20);
        local.title = "Local Title".to_string();

        let mut synced = record("h", 20);
        synced.title = "Remote Title".to_string();
        synced.uploaded_at = Some(5);

        let merged = BookRecord::resolve(&local, &synced);
        assert_eq!(merged.title, "Local Title");
        // Synced supplies what local lacks.
        assert_eq!(merged.uploaded_at, Some(5));
    }

    #[test]
    fn test_serializes_camel_case_wire_names() {
        let mut book = record("h", 5);
        book.cover_downloaded_at = Some(9);
        let json = serde_json::to_value(&book).unwrap();
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("coverDownloadedAt").is_some());
        // None fields are omitted from the wire.
        assert!(json.get("deletedAt").is_none());
    }

    proptest! {
        #[test]
        fn test_overlay_option_fields_prefer_top_then_base(
            top_deleted in proptest::option::of(1i64..10_000),
            base_deleted in proptest::option::of(1i64..10_000),
            top_uploaded in proptest::option::of(1i64..10_000),
            base_uploaded in proptest::option::of(1i64..10_000),
            top_format in proptest::option::of("[a-z]{3,4}"),
            base_format in proptest::option::of("[a-z]{3,4}"),
        ) {
            let mut base = record("h", 1);
            base.deleted_at = base_deleted;
            base.uploaded_at = base_uploaded;
            base.format = base_format.clone();

            let mut top = record("h", 2);
            top.deleted_at = top_deleted;
            top.uploaded_at = top_uploaded;
            top.format = top_format.clone();

            let merged = BookRecord::overlay(&base, &top);
            prop_assert_eq!(merged.deleted_at, top_deleted.or(base_deleted));
            prop_assert_eq!(merged.uploaded_at, top_uploaded.or(base_uploaded));
            prop_assert_eq!(merged.format, top_format.or(base_format));
            prop_assert_eq!(merged.updated_at, top.updated_at);
        }
    }
}
