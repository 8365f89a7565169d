//! Persistent store
//!
//! SQLite-backed storage for users, gated channels, access grants and the
//! action audit log. The worker opens (and creates on first use) the store
//! file at the configured `DATABASE_PATH`; the containing directory is
//! guaranteed by the runtime host. The schema is bootstrapped idempotently
//! on every open.

pub mod channels;
pub mod logs;
pub mod users;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored timestamp `{0}`")]
    Timestamp(String),
}

/// Handle to the SQLite store. The worker is the sole owner of the file;
/// locking discipline across processes is not this layer's concern.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating on first use) the store at `path` and bootstrap the
    /// schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    /// In-memory store, mainly for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        join_date TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_check TEXT,
        notifications_enabled INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS channels (
        channel_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        days_required INTEGER NOT NULL DEFAULT 0,
        is_main INTEGER NOT NULL DEFAULT 0,
        description TEXT,
        emoji TEXT NOT NULL DEFAULT '📺'
    );

    CREATE TABLE IF NOT EXISTS user_channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        channel_id INTEGER NOT NULL,
        granted_at TEXT NOT NULL,
        message_id INTEGER,
        FOREIGN KEY (user_id) REFERENCES users(user_id),
        FOREIGN KEY (channel_id) REFERENCES channels(channel_id),
        UNIQUE(user_id, channel_id)
    );

    CREATE TABLE IF NOT EXISTS action_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        action_type TEXT NOT NULL,
        details TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_users_active ON users(is_active);
    CREATE INDEX IF NOT EXISTS idx_user_channels_user ON user_channels(user_id);
    CREATE INDEX IF NOT EXISTS idx_logs_user ON action_logs(user_id);
    CREATE INDEX IF NOT EXISTS idx_logs_type ON action_logs(action_type);
    CREATE INDEX IF NOT EXISTS idx_logs_date ON action_logs(created_at);
";

/// Timestamps are stored as RFC 3339 text.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}
