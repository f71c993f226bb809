//! Bookmark storage and change feed.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{Bookmark, BookmarkChange};
pub use store::SqliteBookmarkStore;
pub use trait_def::BookmarkStore;
