//! Reconciliation of change-feed events into list state.

use crate::bookmark_store::{Bookmark, BookmarkChange};

/// Fold one change-feed event into a newest-first bookmark sequence.
///
/// This is a pure function of (previous sequence, event), independent of any
/// transport or render timing:
/// - insert: discarded when the id is already present (a full reload and the
///   feed can both deliver the same new record), otherwise prepended — new
///   records are the newest, so descending timestamp order holds without
///   re-sorting;
/// - delete: removes the matching record, no-op when absent;
/// - update: replaces the matching record in place, no-op when absent.
pub fn apply_change(bookmarks: Vec<Bookmark>, change: &BookmarkChange) -> Vec<Bookmark> {
    match change {
        BookmarkChange::Inserted { bookmark } => {
            if bookmarks.iter().any(|b| b.id == bookmark.id) {
                return bookmarks;
            }
            let mut next = Vec::with_capacity(bookmarks.len() + 1);
            next.push(bookmark.clone());
            next.extend(bookmarks);
            next
        }
        BookmarkChange::Deleted { id, .. } => {
            bookmarks.into_iter().filter(|b| &b.id != id).collect()
        }
        BookmarkChange::Updated { bookmark } => bookmarks
            .into_iter()
            .map(|b| {
                if b.id == bookmark.id {
                    bookmark.clone()
                } else {
                    b
                }
            })
            .collect(),
    }
}

/// In-memory state of one bookmark list view.
///
/// Holds the newest-first sequence, the loading flag, and the reload
/// sequence counter that makes the reload/feed race deterministic: every
/// full read is tagged when issued, and a completed read is applied only if
/// its tag is still the latest issued. Feed events keep applying while reads
/// are in flight.
#[derive(Debug, Clone)]
pub struct ListState {
    bookmarks: Vec<Bookmark>,
    loading: bool,
    issued_seq: u64,
}

impl ListState {
    pub fn new() -> Self {
        Self {
            bookmarks: Vec::new(),
            loading: true,
            issued_seq: 0,
        }
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Tag a new full read. Invalidates every read issued earlier.
    pub fn begin_reload(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    /// Install a completed full read. Returns false (state untouched) when a
    /// newer read has been issued since this one was tagged.
    pub fn complete_reload(&mut self, seq: u64, bookmarks: Vec<Bookmark>) -> bool {
        if seq != self.issued_seq {
            return false;
        }
        self.bookmarks = bookmarks;
        self.loading = false;
        true
    }

    /// Apply one feed event to the current sequence, in arrival order.
    pub fn apply(&mut self, change: &BookmarkChange) {
        self.bookmarks = apply_change(std::mem::take(&mut self.bookmarks), change);
    }
}

impl Default for ListState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(id: &str, title: &str) -> Bookmark {
        Bookmark {
            id: id.to_string(),
            user_id: 1,
            title: title.to_string(),
            url: format!("https://{}.example", id),
            created_at: 1701700000,
        }
    }

    fn inserted(id: &str, title: &str) -> BookmarkChange {
        BookmarkChange::Inserted {
            bookmark: bookmark(id, title),
        }
    }

    fn deleted(id: &str) -> BookmarkChange {
        BookmarkChange::Deleted {
            id: id.to_string(),
            user_id: 1,
        }
    }

    fn ids(bookmarks: &[Bookmark]) -> Vec<&str> {
        bookmarks.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn insert_prepends_new_record() {
        let list = apply_change(vec![bookmark("a", "A")], &inserted("b", "B"));
        assert_eq!(ids(&list), vec!["b", "a"]);
    }

    #[test]
    fn insert_of_present_id_is_a_noop() {
        let before = vec![bookmark("b", "B"), bookmark("a", "A")];
        let after = apply_change(before.clone(), &inserted("a", "A again"));
        assert_eq!(after, before);
    }

    #[test]
    fn delete_removes_matching_record() {
        let before = vec![bookmark("b", "B"), bookmark("a", "A")];
        let after = apply_change(before, &deleted("b"));
        assert_eq!(ids(&after), vec!["a"]);
    }

    #[test]
    fn delete_of_absent_id_is_a_noop() {
        let before = vec![bookmark("a", "A")];
        let after = apply_change(before.clone(), &deleted("zzz"));
        assert_eq!(after, before);
    }

    #[test]
    fn update_replaces_in_place() {
        let before = vec![bookmark("c", "C"), bookmark("b", "B"), bookmark("a", "A")];
        let after = apply_change(
            before,
            &BookmarkChange::Updated {
                bookmark: bookmark("b", "B renamed"),
            },
        );
        assert_eq!(ids(&after), vec!["c", "b", "a"]);
        assert_eq!(after[1].title, "B renamed");
    }

    #[test]
    fn update_of_absent_id_is_a_noop() {
        let before = vec![bookmark("a", "A")];
        let after = apply_change(
            before.clone(),
            &BookmarkChange::Updated {
                bookmark: bookmark("zzz", "nope"),
            },
        );
        assert_eq!(after, before);
    }

    #[test]
    fn event_sequences_never_produce_duplicate_ids() {
        let events = vec![
            inserted("a", "A"),
            inserted("b", "B"),
            inserted("a", "A dup"),
            deleted("zzz"),
            inserted("c", "C"),
            deleted("b"),
            inserted("b", "B back"),
            inserted("c", "C dup"),
        ];

        let mut list = Vec::new();
        for event in &events {
            list = apply_change(list, event);
            let mut seen = std::collections::HashSet::new();
            for b in &list {
                assert!(seen.insert(b.id.clone()), "duplicate id {}", b.id);
            }
        }
        assert_eq!(ids(&list), vec!["b", "c", "a"]);
    }

    #[test]
    fn new_state_is_loading_and_empty() {
        let state = ListState::new();
        assert!(state.is_loading());
        assert!(state.bookmarks().is_empty());
    }

    #[test]
    fn completed_reload_installs_and_clears_loading() {
        let mut state = ListState::new();
        let seq = state.begin_reload();
        assert!(state.complete_reload(seq, vec![bookmark("a", "A")]));
        assert!(!state.is_loading());
        assert_eq!(ids(state.bookmarks()), vec!["a"]);
    }

    #[test]
    fn stale_reload_is_discarded() {
        let mut state = ListState::new();
        let first = state.begin_reload();
        let second = state.begin_reload();

        // The newer read lands first
        assert!(state.complete_reload(second, vec![bookmark("new", "New")]));
        // The stale one must not overwrite it
        assert!(!state.complete_reload(first, vec![bookmark("old", "Old")]));
        assert_eq!(ids(state.bookmarks()), vec!["new"]);
    }

    #[test]
    fn feed_events_apply_while_reload_is_in_flight() {
        let mut state = ListState::new();
        let seq = state.begin_reload();

        // A feed insert arrives before the read completes
        state.apply(&inserted("live", "Live"));
        assert_eq!(ids(state.bookmarks()), vec!["live"]);

        // The read then lands, replacing state wholesale; the feed record is
        // part of the read result since it was committed before the read.
        assert!(state.complete_reload(seq, vec![bookmark("live", "Live"), bookmark("a", "A")]));
        assert_eq!(ids(state.bookmarks()), vec!["live", "a"]);
    }

    #[test]
    fn reload_then_duplicate_feed_insert_is_deduplicated() {
        let mut state = ListState::new();
        let seq = state.begin_reload();
        assert!(state.complete_reload(seq, vec![bookmark("a", "A")]));

        // The feed delivers the same record the reload already contained
        state.apply(&inserted("a", "A"));
        assert_eq!(ids(state.bookmarks()), vec!["a"]);
    }
}
