//! Bookmark record and change-feed event types.

use serde::{Deserialize, Serialize};

/// A single saved link, owned by one user.
///
/// The id is assigned by the store on insert and is stable for the record's
/// lifetime. Display order is `created_at` descending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub id: String,
    pub user_id: usize,
    pub title: String,
    pub url: String,
    /// Unix timestamp (seconds), assigned by the store on insert.
    pub created_at: i64,
}

/// A change-feed event emitted by the bookmark store.
///
/// Events are serialized using serde's adjacently tagged representation:
/// `{"type": "insert", "payload": {...}}`
///
/// An `update` event is part of the feed contract and is handled by the
/// reconciler, but no route of this server currently produces one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum BookmarkChange {
    #[serde(rename = "insert")]
    Inserted { bookmark: Bookmark },

    #[serde(rename = "update")]
    Updated { bookmark: Bookmark },

    #[serde(rename = "delete")]
    Deleted { id: String, user_id: usize },
}

impl BookmarkChange {
    /// Get the event type string for logging and dispatch.
    pub fn event_type(&self) -> &'static str {
        match self {
            BookmarkChange::Inserted { .. } => "insert",
            BookmarkChange::Updated { .. } => "update",
            BookmarkChange::Deleted { .. } => "delete",
        }
    }

    /// The owner whose views this event is relevant to.
    pub fn user_id(&self) -> usize {
        match self {
            BookmarkChange::Inserted { bookmark } | BookmarkChange::Updated { bookmark } => {
                bookmark.user_id
            }
            BookmarkChange::Deleted { user_id, .. } => *user_id,
        }
    }

    /// Identifier of the affected record.
    pub fn bookmark_id(&self) -> &str {
        match self {
            BookmarkChange::Inserted { bookmark } | BookmarkChange::Updated { bookmark } => {
                &bookmark.id
            }
            BookmarkChange::Deleted { id, .. } => id,
        }
    }
}
