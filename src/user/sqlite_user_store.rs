use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
use crate::user::auth::{AuthToken, AuthTokenValue};
use crate::user::user_store::{User, UserAuthTokenStore, UserStore};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("subject", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("email", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_subject", "subject")],
};

const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_value", "value")],
};

const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[USER_TABLE_V_0, AUTH_TOKEN_TABLE_V_0],
    migration: None,
}];

fn systime_to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn secs_to_systime(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(db_path)?;
            VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        if db_version >= VERSIONED_SCHEMAS.len() as i64 {
            bail!("Database version {} is too new", db_version);
        }

        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM auth_token WHERE value = ?1",
                params![token.0],
                |row| {
                    Ok(AuthToken {
                        user_id: row.get(0)?,
                        value: AuthTokenValue(row.get(1)?),
                        created: secs_to_systime(row.get(2)?),
                        last_used: row.get::<_, Option<i64>>(3)?.map(secs_to_systime),
                    })
                },
            )
            .optional()
            .context("Failed to query auth token")?;
        Ok(row)
    }

    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let existing = self.get_user_auth_token(token)?;
        if existing.is_some() {
            self.conn
                .lock()
                .unwrap()
                .execute("DELETE FROM auth_token WHERE value = ?1", params![token.0])
                .context("Failed to delete auth token")?;
        }
        Ok(existing)
    }

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE auth_token SET last_used = ?1 WHERE value = ?2",
                params![systime_to_secs(SystemTime::now()), token.0],
            )
            .context("Failed to update auth token last_used timestamp")?;
        Ok(())
    }

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO auth_token (user_id, value, created, last_used)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    token.user_id,
                    token.value.0,
                    systime_to_secs(token.created),
                    token.last_used.map(systime_to_secs)
                ],
            )
            .context("Failed to add auth token")?;
        Ok(())
    }
}

impl UserStore for SqliteUserStore {
    fn upsert_user_by_subject(&self, subject: &str, email: Option<&str>) -> Result<User> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO user (subject, email) VALUES (?1, ?2)
                 ON CONFLICT(subject) DO UPDATE SET email = excluded.email",
                params![subject, email],
            )
            .context("Failed to upsert user")?;
        }
        self.get_user_by_subject(subject)?
            .context("User missing right after upsert")
    }

    fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, subject, email FROM user WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        subject: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user by id")?;
        Ok(user)
    }

    fn get_user_by_subject(&self, subject: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, subject, email FROM user WHERE subject = ?1",
                params![subject],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        subject: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user by subject")?;
        Ok(user)
    }
}
