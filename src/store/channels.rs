//! Channels and access grants

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_ts, Store, StoreError};

/// A channel known to the bot: either the main channel or a gated tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub channel_id: i64,
    pub name: String,
    pub days_required: u32,
    pub is_main: bool,
    pub description: Option<String>,
    pub emoji: String,
}

/// A user's grant to a gated channel, joined with the channel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedChannel {
    pub channel_id: i64,
    pub name: String,
    pub days_required: u32,
    pub granted_at: DateTime<Utc>,
    /// Notification message recorded for this grant, if any.
    pub message_id: Option<i64>,
}

/// What was removed by a revocation, kept so any recorded notification can
/// be cleaned up by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedGrant {
    pub channel_id: i64,
    pub message_id: Option<i64>,
}

fn map_channel(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        channel_id: row.get(0)?,
        name: row.get(1)?,
        days_required: row.get(2)?,
        is_main: row.get(3)?,
        description: row.get(4)?,
        emoji: row.get(5)?,
    })
}

const CHANNEL_COLUMNS: &str = "channel_id, name, days_required, is_main, description, emoji";

impl Store {
    /// Create or replace a channel definition.
    pub fn upsert_channel(
        &self,
        channel_id: i64,
        name: &str,
        days_required: u32,
        is_main: bool,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO channels (channel_id, name, days_required, is_main)
             VALUES (?1, ?2, ?3, ?4)",
            params![channel_id, name, days_required, is_main],
        )?;
        Ok(())
    }

    pub fn channel(&self, channel_id: i64) -> Result<Option<Channel>, StoreError> {
        let channel = self
            .conn
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = ?1"),
                params![channel_id],
                map_channel,
            )
            .optional()?;
        Ok(channel)
    }

    /// All channels, cheapest tier first.
    pub fn channels(&self) -> Result<Vec<Channel>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY days_required"
        ))?;
        let channels = stmt
            .query_map([], map_channel)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    /// The gated tiers only, main channel excluded.
    pub fn gated_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE is_main = 0 ORDER BY days_required"
        ))?;
        let channels = stmt
            .query_map([], map_channel)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    /// Record a grant. Returns false if the user already had access
    /// (grants are unique per user and channel).
    pub fn grant_access(
        &self,
        user_id: i64,
        channel_id: i64,
        message_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO user_channels (user_id, channel_id, granted_at, message_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, channel_id, Utc::now().to_rfc3339(), message_id],
        )?;
        Ok(inserted > 0)
    }

    /// Attach a notification message id to an existing grant.
    pub fn set_grant_message_id(
        &self,
        user_id: i64,
        channel_id: i64,
        message_id: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE user_channels SET message_id = ?1 WHERE user_id = ?2 AND channel_id = ?3",
            params![message_id, user_id, channel_id],
        )?;
        Ok(())
    }

    /// All grants held by a user, joined with the channel definitions.
    pub fn user_grants(&self, user_id: i64) -> Result<Vec<GrantedChannel>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT uc.channel_id, c.name, c.days_required, uc.granted_at, uc.message_id
             FROM user_channels uc
             JOIN channels c ON uc.channel_id = c.channel_id
             WHERE uc.user_id = ?1
             ORDER BY c.days_required",
        )?;
        let raws = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter()
            .map(|(channel_id, name, days_required, granted_at, message_id)| {
                Ok(GrantedChannel {
                    channel_id,
                    name,
                    days_required,
                    granted_at: parse_ts(&granted_at)?,
                    message_id,
                })
            })
            .collect()
    }

    pub fn has_access(&self, user_id: i64, channel_id: i64) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM user_channels WHERE user_id = ?1 AND channel_id = ?2")?;
        Ok(stmt.exists(params![user_id, channel_id])?)
    }

    /// Drop every grant a user holds, returning what was removed.
    pub fn revoke_all(&self, user_id: i64) -> Result<Vec<RevokedGrant>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT channel_id, message_id FROM user_channels WHERE user_id = ?1")?;
        let revoked = stmt
            .query_map(params![user_id], |row| {
                Ok(RevokedGrant {
                    channel_id: row.get(0)?,
                    message_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.conn.execute(
            "DELETE FROM user_channels WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(revoked)
    }

    /// How many users hold a grant to a channel.
    pub fn channel_grant_count(&self, channel_id: i64) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_channels WHERE channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
