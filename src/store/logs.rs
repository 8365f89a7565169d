//! Action audit log and key-value settings

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_ts, Store, StoreError};

/// One recorded action, newest-first when listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action_type: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Append an entry to the audit log.
    pub fn log_action(
        &self,
        user_id: Option<i64>,
        action_type: &str,
        details: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO action_logs (user_id, action_type, details, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, action_type, details, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// The most recent audit entries, newest first.
    pub fn recent_actions(&self, limit: u32) -> Result<Vec<ActionLog>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, action_type, details, created_at
             FROM action_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let raws = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter()
            .map(|(id, user_id, action_type, details, created_at)| {
                Ok(ActionLog {
                    id,
                    user_id,
                    action_type,
                    details,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_log_append_and_list() {
        let store = Store::in_memory().unwrap();
        store.log_action(Some(1), "registered", None).unwrap();
        store
            .log_action(Some(1), "access_granted", Some("200"))
            .unwrap();
        store.log_action(None, "daily_check", Some("ok")).unwrap();

        let recent = store.recent_actions(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action_type, "daily_check");
        assert_eq!(recent[0].user_id, None);
        assert_eq!(recent[1].action_type, "access_granted");
        assert_eq!(recent[1].details.as_deref(), Some("200"));
    }

    #[test]
    fn test_settings_roundtrip() {
        let store = Store::in_memory().unwrap();
        assert!(store.setting("greeting").unwrap().is_none());

        store.put_setting("greeting", "hello").unwrap();
        assert_eq!(store.setting("greeting").unwrap().as_deref(), Some("hello"));

        store.put_setting("greeting", "replaced").unwrap();
        assert_eq!(
            store.setting("greeting").unwrap().as_deref(),
            Some("replaced")
        );
    }
}
