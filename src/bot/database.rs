//! SQLite persistence for users and bot settings.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::bot::error::BotError;

/// A known chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub is_admin: bool,
    /// Whether the user wants a ping when a meetup is coming up.
    pub notify_meetups: bool,
}

impl User {
    /// Format as "@username (id)" or just the id if no username is known.
    pub fn display(&self) -> String {
        match &self.username {
            Some(u) => format!("@{} ({})", u, self.user_id),
            None => self.user_id.to_string(),
        }
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, BotError> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        info!("Database ready at {:?}", path);
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, BotError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                notify_meetups INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS config_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_is_admin ON users(is_admin);
        "#,
        )?;
        Ok(())
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            user_id: row.get(0)?,
            username: row.get(1)?,
            is_admin: row.get(2)?,
            notify_meetups: row.get(3)?,
        })
    }

    /// Fetch the user, creating the record on first contact and refreshing
    /// the stored username when it changed.
    pub fn find_or_create_user(
        &self,
        user_id: i64,
        username: Option<&str>,
    ) -> Result<User, BotError> {
        let conn = self.conn.lock().unwrap();
        let existing = conn
            .query_row(
                "SELECT user_id, username, is_admin, notify_meetups FROM users WHERE user_id = ?1",
                params![user_id],
                Self::row_to_user,
            )
            .optional()?;

        match existing {
            Some(mut user) => {
                if user.username.as_deref() != username {
                    conn.execute(
                        "UPDATE users SET username = ?1 WHERE user_id = ?2",
                        params![username, user_id],
                    )?;
                    user.username = username.map(String::from);
                }
                Ok(user)
            }
            None => {
                conn.execute(
                    "INSERT INTO users (user_id, username) VALUES (?1, ?2)",
                    params![user_id, username],
                )?;
                Ok(User {
                    user_id,
                    username: username.map(String::from),
                    is_admin: false,
                    notify_meetups: false,
                })
            }
        }
    }

    pub fn find_user(&self, user_id: i64) -> Result<Option<User>, BotError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT user_id, username, is_admin, notify_meetups FROM users WHERE user_id = ?1",
                params![user_id],
                Self::row_to_user,
            )
            .optional()?)
    }

    pub fn list_admins(&self) -> Result<Vec<User>, BotError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, username, is_admin, notify_meetups FROM users
             WHERE is_admin = 1 ORDER BY user_id",
        )?;
        let admins = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(admins)
    }

    /// Set or clear the admin flag, creating the record when absent.
    pub fn set_admin(&self, user_id: i64, is_admin: bool) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (user_id, is_admin) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET is_admin = excluded.is_admin",
            params![user_id, is_admin],
        )?;
        Ok(())
    }

    pub fn get_entry(&self, key: &str) -> Result<Option<String>, BotError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT value FROM config_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_entry(&self, key: &str, value: &str) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO config_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
