//! User records

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_ts, Store, StoreError};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Start of the current continuous subscription.
    pub join_date: DateTime<Utc>,
    pub is_active: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub notifications_enabled: bool,
}

const USER_COLUMNS: &str =
    "user_id, username, first_name, join_date, is_active, last_check, notifications_enabled";

/// Row image before timestamp parsing.
struct RawUser {
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    join_date: String,
    is_active: bool,
    last_check: Option<String>,
    notifications_enabled: bool,
}

impl RawUser {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            join_date: row.get(3)?,
            is_active: row.get(4)?,
            last_check: row.get(5)?,
            notifications_enabled: row.get(6)?,
        })
    }

    fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            user_id: self.user_id,
            username: self.username,
            first_name: self.first_name,
            join_date: parse_ts(&self.join_date)?,
            is_active: self.is_active,
            last_check: self.last_check.as_deref().map(parse_ts).transpose()?,
            notifications_enabled: self.notifications_enabled,
        })
    }
}

impl Store {
    /// Register a new user joined now. Returns false if the user already
    /// exists.
    pub fn create_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.create_user_joined_at(user_id, username, first_name, Utc::now())
    }

    /// Register a new user with an explicit join date.
    pub fn create_user_joined_at(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        join_date: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users (user_id, username, first_name, join_date, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![user_id, username, first_name, join_date.to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// Fetch a user by id.
    pub fn user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                RawUser::from_row,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    /// Flip a user's active flag and stamp the check time.
    pub fn set_user_active(&self, user_id: i64, active: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE users SET is_active = ?1, last_check = ?2 WHERE user_id = ?3",
            params![active, Utc::now().to_rfc3339(), user_id],
        )?;
        Ok(())
    }

    /// All users still considered subscribed.
    pub fn active_users(&self) -> Result<Vec<User>, StoreError> {
        self.query_users(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active = 1"
        ))
    }

    /// Every user ever registered, active or not.
    pub fn all_users(&self) -> Result<Vec<User>, StoreError> {
        self.query_users(&format!("SELECT {USER_COLUMNS} FROM users"))
    }

    pub fn count_active_users(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_users(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn query_users(&self, sql: &str) -> Result<Vec<User>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map([], RawUser::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawUser::into_user).collect()
    }
}
