//! Worker configuration
//!
//! All recognized environment options are parsed once at process entry into
//! an immutable struct; nothing deeper in the call stack reads the
//! environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// Default location of the persistent store inside the image.
pub const DEFAULT_DATABASE_PATH: &str = "/app/data/bot_database.db";

/// Tier unlock thresholds, in days of continuous subscription.
/// Tier 1 is the main channel itself (0 days).
const TIER_DAYS: [u32; 4] = [32, 64, 96, 124];

/// A gated channel unlocked after a number of subscribed days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel_id: i64,
    pub name: String,
    /// Days of continuous subscription required before access is granted.
    pub days_required: u32,
}

/// Worker configuration, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Filesystem path of the persistent store file.
    pub database_path: PathBuf,
    /// User ids allowed to use administrative operations.
    pub admin_ids: Vec<i64>,
    /// The main channel every user must stay subscribed to.
    pub main_channel_id: i64,
    /// Gated tier channels, ordered by unlock threshold.
    pub channels: Vec<ChannelSpec>,
    /// Local hour of the daily subscription check.
    pub check_hour: u32,
    /// Local minute of the daily subscription check.
    pub check_minute: u32,
}

impl BotConfig {
    /// Parse configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Parse configuration from an explicit key-value map.
    ///
    /// Unset options get their documented defaults; malformed numeric values
    /// are ignored with a warning rather than aborting startup.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let database_path = vars
            .get("DATABASE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let admin_ids = vars
            .get("ADMIN_IDS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|part| {
                        let part = part.trim();
                        if part.is_empty() {
                            return None;
                        }
                        match part.parse() {
                            Ok(id) => Some(id),
                            Err(_) => {
                                tracing::warn!("ignoring invalid ADMIN_IDS entry `{part}`");
                                None
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let main_channel_id = parse_or(vars, "MAIN_CHANNEL_ID", 0i64);

        let channels = TIER_DAYS
            .iter()
            .enumerate()
            .map(|(i, &days_required)| {
                let n = i + 2;
                ChannelSpec {
                    channel_id: parse_or(vars, &format!("CHANNEL_{n}_ID"), 0i64),
                    name: vars
                        .get(&format!("CHANNEL_{n}_NAME"))
                        .filter(|v| !v.trim().is_empty())
                        .cloned()
                        .unwrap_or_else(|| format!("Module {n}")),
                    days_required,
                }
            })
            .collect();

        let mut check_hour = parse_or(vars, "SCHEDULER_HOUR", 10u32);
        if check_hour > 23 {
            tracing::warn!("SCHEDULER_HOUR={check_hour} out of range, using 10");
            check_hour = 10;
        }
        let mut check_minute = parse_or(vars, "SCHEDULER_MINUTE", 0u32);
        if check_minute > 59 {
            tracing::warn!("SCHEDULER_MINUTE={check_minute} out of range, using 0");
            check_minute = 0;
        }

        Self {
            database_path,
            admin_ids,
            main_channel_id,
            channels,
            check_hour,
            check_minute,
        }
    }

    /// Whether a user may run administrative operations.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

/// Interpret an on/off environment toggle. Absent means enabled; only an
/// explicit `0`, `false` or empty value disables it.
pub fn flag_enabled(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "" | "0" | "false"),
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + Display,
{
    match vars.get(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring invalid {key}=`{raw}`, using {default}");
            default
        }),
    }
}
