//! SQLite-backed bookmark store implementation.

use super::models::{Bookmark, BookmarkChange};
use super::schema::BOOKMARK_VERSIONED_SCHEMAS;
use super::trait_def::BookmarkStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the change-feed channel. A subscriber that falls further
/// behind than this observes a lag error and must re-read the full set.
const CHANGE_FEED_CAPACITY: usize = 64;

/// SQLite-backed bookmark store with an in-process change feed.
#[derive(Clone)]
pub struct SqliteBookmarkStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<BookmarkChange>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = BOOKMARK_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &BOOKMARK_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating bookmarks db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        0
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in BOOKMARK_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating bookmarks db from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;
    Ok(())
}

impl SqliteBookmarkStore {
    /// Create a new SqliteBookmarkStore, creating the database if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open bookmarks database")?;

        migrate_if_needed(&mut write_conn)?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on bookmarks write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open bookmarks database for reading")?;

        read_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on bookmarks read connection")?;

        let count: usize =
            read_conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |r| r.get(0))?;
        info!("Bookmark store ready: {} bookmarks", count);

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
            changes,
        })
    }

    fn emit(&self, change: BookmarkChange) {
        // A send error only means nobody is subscribed right now.
        let _ = self.changes.send(change);
    }
}

impl BookmarkStore for SqliteBookmarkStore {
    fn insert_bookmark(&self, user_id: usize, title: &str, url: &str) -> Result<Bookmark> {
        let bookmark = Bookmark {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            title: title.to_string(),
            url: url.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };

        self.write_conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO bookmarks (id, user_id, title, url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    bookmark.id,
                    bookmark.user_id,
                    bookmark.title,
                    bookmark.url,
                    bookmark.created_at
                ],
            )
            .context("Failed to insert bookmark")?;

        self.emit(BookmarkChange::Inserted {
            bookmark: bookmark.clone(),
        });
        Ok(bookmark)
    }

    fn get_user_bookmarks(&self, user_id: usize) -> Result<Vec<Bookmark>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, url, created_at FROM bookmarks
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let bookmarks = stmt
            .query_map(params![user_id], |row| {
                Ok(Bookmark {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    url: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bookmarks)
    }

    fn delete_bookmark(&self, bookmark_id: &str, user_id: usize) -> Result<bool> {
        let deleted = self
            .write_conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
                params![bookmark_id, user_id],
            )
            .context("Failed to delete bookmark")?;

        if deleted > 0 {
            self.emit(BookmarkChange::Deleted {
                id: bookmark_id.to_string(),
                user_id,
            });
        }
        Ok(deleted > 0)
    }

    fn subscribe(&self) -> broadcast::Receiver<BookmarkChange> {
        self.changes.subscribe()
    }
}
