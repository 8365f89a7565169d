//! Subscription engine
//!
//! Tier progression over the persistent store: users unlock gated channels
//! after a configured number of days of continuous subscription, and lose
//! everything when they leave the main channel. Whether a user is still a
//! member is answered by a [`MembershipProbe`]; the engine itself never
//! talks to any messaging platform.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{BotConfig, ChannelSpec};
use crate::store::channels::{GrantedChannel, RevokedGrant};
use crate::store::users::User;
use crate::store::{Store, StoreError};

/// External membership oracle. The real implementation lives outside this
/// crate; anything that can answer "is this user in this channel" fits.
pub trait MembershipProbe {
    fn is_member(&self, channel_id: i64, user_id: i64) -> bool;
}

impl<F> MembershipProbe for F
where
    F: Fn(i64, i64) -> bool,
{
    fn is_member(&self, channel_id: i64, user_id: i64) -> bool {
        self(channel_id, user_id)
    }
}

/// Probe used when no external membership source is wired in: every active
/// user is treated as still subscribed, so progression is purely
/// time-based.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeSubscribed;

impl MembershipProbe for AssumeSubscribed {
    fn is_member(&self, _channel_id: i64, _user_id: i64) -> bool {
        true
    }
}

/// What registering a user resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    New,
    Existing,
    /// A previously deactivated user came back; the subscription clock
    /// restarts from the original join date.
    Reactivated,
}

/// Outcome tally of one full subscription sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    pub checked: u64,
    pub granted: u64,
    pub deactivated: u64,
    pub errors: u64,
}

/// Snapshot of a user's standing.
#[derive(Debug, Clone)]
pub struct UserStatus {
    pub user: User,
    pub days_subscribed: u32,
    pub channels: Vec<GrantedChannel>,
}

enum UserCheck {
    Member { granted: u64 },
    Deactivated,
}

/// The subscription engine.
pub struct SubscriptionService<'a, P> {
    store: &'a Store,
    config: &'a BotConfig,
    probe: P,
}

impl<'a, P: MembershipProbe> SubscriptionService<'a, P> {
    pub fn new(store: &'a Store, config: &'a BotConfig, probe: P) -> Self {
        Self {
            store,
            config,
            probe,
        }
    }

    /// Register a user, reactivating a previously deactivated record.
    pub fn register_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<RegisterOutcome, StoreError> {
        if let Some(user) = self.store.user(user_id)? {
            if !user.is_active {
                self.store.set_user_active(user_id, true)?;
                self.store.log_action(Some(user_id), "reactivated", None)?;
                return Ok(RegisterOutcome::Reactivated);
            }
            return Ok(RegisterOutcome::Existing);
        }

        self.store.create_user(user_id, username, first_name)?;
        self.store.log_action(Some(user_id), "registered", None)?;
        Ok(RegisterOutcome::New)
    }

    /// Tier channels the user has earned but not yet been granted.
    pub fn available_channels(&self, user_id: i64) -> Result<Vec<ChannelSpec>, StoreError> {
        let Some(user) = self.store.user(user_id)? else {
            return Ok(Vec::new());
        };
        if !user.is_active {
            return Ok(Vec::new());
        }

        let days = days_since(user.join_date, Utc::now());
        let mut available = Vec::new();
        for spec in &self.config.channels {
            if spec.channel_id == 0 || spec.days_required > days {
                continue;
            }
            if !self.store.has_access(user_id, spec.channel_id)? {
                available.push(spec.clone());
            }
        }
        Ok(available)
    }

    /// Record a grant. Returns false when the user already had access.
    pub fn grant_channel_access(&self, user_id: i64, channel_id: i64) -> Result<bool, StoreError> {
        if !self.store.grant_access(user_id, channel_id, None)? {
            return Ok(false);
        }
        self.store.log_action(
            Some(user_id),
            "access_granted",
            Some(&channel_id.to_string()),
        )?;
        Ok(true)
    }

    /// Drop every grant the user holds and deactivate the record. Returns
    /// the removed grants so recorded notifications can be cleaned up.
    pub fn revoke_user_access(&self, user_id: i64) -> Result<Vec<RevokedGrant>, StoreError> {
        let revoked = self.store.revoke_all(user_id)?;
        self.store.set_user_active(user_id, false)?;
        self.store.log_action(
            Some(user_id),
            "access_revoked",
            Some(&revoked.len().to_string()),
        )?;
        Ok(revoked)
    }

    /// Full standing of a user, or None for unknown users.
    pub fn user_status(&self, user_id: i64) -> Result<Option<UserStatus>, StoreError> {
        let Some(user) = self.store.user(user_id)? else {
            return Ok(None);
        };
        let days_subscribed = days_since(user.join_date, Utc::now());
        let channels = self.store.user_grants(user_id)?;
        Ok(Some(UserStatus {
            user,
            days_subscribed,
            channels,
        }))
    }

    /// The daily sweep: every active user is probed for main-channel
    /// membership; lapsed users are revoked, persistent ones accrue any
    /// newly unlocked tiers. A failure on one user is counted and does not
    /// stop the sweep.
    pub fn process_daily_check(&self) -> Result<CheckStats, StoreError> {
        let mut stats = CheckStats::default();

        for user in self.store.active_users()? {
            stats.checked += 1;
            match self.check_user(&user) {
                Ok(UserCheck::Deactivated) => stats.deactivated += 1,
                Ok(UserCheck::Member { granted }) => stats.granted += granted,
                Err(e) => {
                    tracing::error!(user = user.user_id, "subscription check failed: {e}");
                    stats.errors += 1;
                }
            }
        }

        self.store.log_action(
            None,
            "daily_check",
            serde_json::to_string(&stats).ok().as_deref(),
        )?;
        Ok(stats)
    }

    fn check_user(&self, user: &User) -> Result<UserCheck, StoreError> {
        if !self.probe.is_member(self.config.main_channel_id, user.user_id) {
            tracing::info!(user = user.user_id, "left the main channel, revoking access");
            self.revoke_user_access(user.user_id)?;
            return Ok(UserCheck::Deactivated);
        }

        let mut granted = 0;
        for spec in self.available_channels(user.user_id)? {
            if self.grant_channel_access(user.user_id, spec.channel_id)? {
                tracing::info!(user = user.user_id, channel = %spec.name, "tier unlocked");
                granted += 1;
            }
        }
        Ok(UserCheck::Member { granted })
    }
}

/// Whole days elapsed between two instants, clamped at zero.
pub(crate) fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    (now - then).num_days().max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;

    fn test_config() -> BotConfig {
        let mut vars = HashMap::new();
        vars.insert("MAIN_CHANNEL_ID".to_string(), "100".to_string());
        vars.insert("CHANNEL_2_ID".to_string(), "200".to_string());
        vars.insert("CHANNEL_3_ID".to_string(), "300".to_string());
        vars.insert("CHANNEL_4_ID".to_string(), "400".to_string());
        vars.insert("CHANNEL_5_ID".to_string(), "500".to_string());
        BotConfig::from_vars(&vars)
    }

    fn seeded_store(config: &BotConfig) -> Store {
        let store = Store::in_memory().unwrap();
        store
            .upsert_channel(config.main_channel_id, "Main", 0, true)
            .unwrap();
        for spec in &config.channels {
            store
                .upsert_channel(spec.channel_id, &spec.name, spec.days_required, false)
                .unwrap();
        }
        store
    }

    fn user_aged(store: &Store, user_id: i64, days: i64) {
        store
            .create_user_joined_at(user_id, None, None, Utc::now() - Duration::days(days))
            .unwrap();
    }

    #[test]
    fn test_days_since() {
        let now = Utc::now();
        assert_eq!(days_since(now - Duration::days(5), now), 5);
        assert_eq!(days_since(now - Duration::hours(23), now), 0);
        // A clock skewed into the future never goes negative.
        assert_eq!(days_since(now + Duration::days(2), now), 0);
    }

    #[test]
    fn test_register_outcomes() {
        let config = test_config();
        let store = seeded_store(&config);
        let service = SubscriptionService::new(&store, &config, AssumeSubscribed);

        assert_eq!(
            service.register_user(1, Some("alice"), None).unwrap(),
            RegisterOutcome::New
        );
        assert_eq!(
            service.register_user(1, None, None).unwrap(),
            RegisterOutcome::Existing
        );

        service.revoke_user_access(1).unwrap();
        assert_eq!(
            service.register_user(1, None, None).unwrap(),
            RegisterOutcome::Reactivated
        );
        assert!(store.user(1).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_tier_unlock_math() {
        let config = test_config();
        let store = seeded_store(&config);
        let service = SubscriptionService::new(&store, &config, AssumeSubscribed);

        // 70 days in: the 32 and 64 day tiers are earned, 96 and 124 not.
        user_aged(&store, 1, 70);
        let available = service.available_channels(1).unwrap();
        let ids: Vec<i64> = available.iter().map(|c| c.channel_id).collect();
        assert_eq!(ids, vec![200, 300]);

        // Granting one removes it from the available set.
        assert!(service.grant_channel_access(1, 200).unwrap());
        let ids: Vec<i64> = service
            .available_channels(1)
            .unwrap()
            .iter()
            .map(|c| c.channel_id)
            .collect();
        assert_eq!(ids, vec![300]);

        // Day boundaries are inclusive.
        user_aged(&store, 2, 32);
        let ids: Vec<i64> = service
            .available_channels(2)
            .unwrap()
            .iter()
            .map(|c| c.channel_id)
            .collect();
        assert_eq!(ids, vec![200]);

        // Too fresh for anything.
        user_aged(&store, 3, 31);
        assert!(service.available_channels(3).unwrap().is_empty());

        // Unknown and inactive users get nothing.
        assert!(service.available_channels(99).unwrap().is_empty());
        service.revoke_user_access(1).unwrap();
        assert!(service.available_channels(1).unwrap().is_empty());
    }

    #[test]
    fn test_revoke_returns_grants_and_deactivates() {
        let config = test_config();
        let store = seeded_store(&config);
        let service = SubscriptionService::new(&store, &config, AssumeSubscribed);

        user_aged(&store, 1, 200);
        service.grant_channel_access(1, 200).unwrap();
        service.grant_channel_access(1, 300).unwrap();
        store.set_grant_message_id(1, 200, 77).unwrap();

        let mut revoked = service.revoke_user_access(1).unwrap();
        revoked.sort_by_key(|g| g.channel_id);
        assert_eq!(revoked.len(), 2);
        assert_eq!(revoked[0].message_id, Some(77));
        assert!(!store.user(1).unwrap().unwrap().is_active);
        assert!(store.user_grants(1).unwrap().is_empty());
    }

    #[test]
    fn test_daily_check_grants_and_deactivates() {
        let config = test_config();
        let store = seeded_store(&config);
        // User 2 has lapsed from the main channel; everyone else is fine.
        let probe = |_channel: i64, user: i64| user != 2;
        let service = SubscriptionService::new(&store, &config, probe);

        user_aged(&store, 1, 70); // earns tiers 32 and 64
        user_aged(&store, 2, 130); // lapsed, would have earned all four
        user_aged(&store, 3, 10); // member, nothing earned yet

        let stats = service.process_daily_check().unwrap();
        assert_eq!(
            stats,
            CheckStats {
                checked: 3,
                granted: 2,
                deactivated: 1,
                errors: 0
            }
        );

        assert!(store.has_access(1, 200).unwrap());
        assert!(store.has_access(1, 300).unwrap());
        assert!(!store.has_access(1, 400).unwrap());
        assert!(!store.user(2).unwrap().unwrap().is_active);
        assert!(store.user_grants(2).unwrap().is_empty());
        assert!(store.user_grants(3).unwrap().is_empty());

        // A second sweep finds nothing new to do.
        let stats = service.process_daily_check().unwrap();
        assert_eq!(
            stats,
            CheckStats {
                checked: 2,
                granted: 0,
                deactivated: 0,
                errors: 0
            }
        );
    }

    #[test]
    fn test_user_status() {
        let config = test_config();
        let store = seeded_store(&config);
        let service = SubscriptionService::new(&store, &config, AssumeSubscribed);

        assert!(service.user_status(1).unwrap().is_none());

        user_aged(&store, 1, 40);
        service.grant_channel_access(1, 200).unwrap();
        let status = service.user_status(1).unwrap().unwrap();
        assert_eq!(status.days_subscribed, 40);
        assert_eq!(status.channels.len(), 1);
        assert_eq!(status.channels[0].channel_id, 200);
    }
}
