//! View registry.
//!
//! Tracks the open list views of each user and carries the refresh signal
//! from the bookmark creation route to them. The registry is an explicit
//! shared dependency: the creation handler holds it and asks for a refresh,
//! each view registers a command channel on mount and deregisters on
//! teardown. Deregistering an already-removed view is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

/// Commands delivered to a registered list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    /// Re-run the full read of the user's bookmarks.
    Refresh,
}

/// Tracks active list views, organized by user.
pub struct ViewRegistry {
    /// user_id -> (view_id -> command sender)
    views: RwLock<HashMap<usize, HashMap<u64, mpsc::Sender<ViewCommand>>>>,
    next_view_id: AtomicU64,
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
            next_view_id: AtomicU64::new(1),
        }
    }

    /// Register a view for a user.
    ///
    /// Returns the view id (needed for deregistration) and the receiver the
    /// view's task should drain for commands.
    pub async fn register(&self, user_id: usize) -> (u64, mpsc::Receiver<ViewCommand>) {
        let view_id = self.next_view_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(8);

        let mut views = self.views.write().await;
        views.entry(user_id).or_default().insert(view_id, tx);

        (view_id, rx)
    }

    /// Deregister a view (called on teardown).
    ///
    /// Removes the entry and cleans up empty user maps. Safe to call for a
    /// view that was already removed.
    pub async fn deregister(&self, user_id: usize, view_id: u64) {
        let mut views = self.views.write().await;
        if let Some(user_views) = views.get_mut(&user_id) {
            user_views.remove(&view_id);
            if user_views.is_empty() {
                views.remove(&user_id);
            }
        }
    }

    /// Ask every open view of a user to re-run its full read.
    ///
    /// Returns the number of views the command reached; views whose channel
    /// is gone are skipped.
    pub async fn request_refresh(&self, user_id: usize) -> usize {
        let views = self.views.read().await;
        let mut reached = 0;

        if let Some(user_views) = views.get(&user_id) {
            for sender in user_views.values() {
                if sender.send(ViewCommand::Refresh).await.is_ok() {
                    reached += 1;
                }
            }
        }

        reached
    }

    /// Number of registered views for a user.
    pub async fn view_count(&self, user_id: usize) -> usize {
        let views = self.views.read().await;
        views.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }
}
