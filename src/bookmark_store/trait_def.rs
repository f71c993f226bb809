//! BookmarkStore trait definition.

use super::models::{Bookmark, BookmarkChange};
use anyhow::Result;
use tokio::sync::broadcast;

/// Trait for bookmark storage backends.
///
/// This is the seam between the application and the managed table it writes
/// to: every operation is scoped to the owning user by the store itself, so
/// callers never filter by owner manually. Implementations also expose the
/// table's change feed via [`subscribe`](BookmarkStore::subscribe).
pub trait BookmarkStore: Send + Sync {
    /// Insert a single bookmark for a user. The store assigns the id and the
    /// creation timestamp. Emits an insert event on the change feed.
    fn insert_bookmark(&self, user_id: usize, title: &str, url: &str) -> Result<Bookmark>;

    /// Get all bookmarks belonging to a user, newest first
    /// (`created_at` descending, insertion order as tiebreak).
    fn get_user_bookmarks(&self, user_id: usize) -> Result<Vec<Bookmark>>;

    /// Delete a bookmark by id, scoped to its owner. Returns true if a row
    /// was deleted; deleting an absent or foreign record returns false and
    /// emits nothing.
    fn delete_bookmark(&self, bookmark_id: &str, user_id: usize) -> Result<bool>;

    /// Open a subscription to the change feed for the bookmarks table.
    ///
    /// The receiver observes every mutation committed through this store, in
    /// commit order. Under heavy lag the feed is lossy
    /// (`broadcast::error::RecvError::Lagged`); subscribers recover with a
    /// full re-read.
    fn subscribe(&self) -> broadcast::Receiver<BookmarkChange>;
}
