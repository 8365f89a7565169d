//! Daily check scheduler
//!
//! Runs the subscription sweep once a day at a configured local time.
//! Plain sleep loop; the next slot is computed from wall-clock time so a
//! long-running worker drifts back onto the configured HH:MM every day.

use chrono::{Local, NaiveDateTime, NaiveTime};
use std::time::Duration;

use crate::services::subscription::{CheckStats, MembershipProbe, SubscriptionService};
use crate::store::StoreError;

const SECS_PER_DAY: i64 = 86_400;

/// Daily scheduler for the subscription sweep.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    hour: u32,
    minute: u32,
}

impl Scheduler {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self {
            hour: hour.min(23),
            minute: minute.min(59),
        }
    }

    /// Seconds until the next occurrence of the configured HH:MM, strictly
    /// in the future: a slot that has just passed rolls to tomorrow.
    /// Partial seconds round up so the sweep never fires early.
    fn seconds_until_next(&self, now: NaiveDateTime) -> u64 {
        let target =
            NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN);
        let mut delta_ms = (target - now.time()).num_milliseconds();
        if delta_ms <= 0 {
            delta_ms += SECS_PER_DAY * 1_000;
        }
        ((delta_ms + 999) / 1_000) as u64
    }

    /// Run the sweep forever. Cancellation is the caller's business (the
    /// worker selects this against its shutdown signal).
    pub async fn run<P: MembershipProbe>(&self, service: &SubscriptionService<'_, P>) {
        tracing::info!(
            "scheduler started, daily check at {:02}:{:02}",
            self.hour,
            self.minute
        );

        loop {
            let wait = self.seconds_until_next(Local::now().naive_local());
            tracing::debug!(seconds = wait, "sleeping until next daily check");
            tokio::time::sleep(Duration::from_secs(wait)).await;

            tracing::info!("running daily subscription check");
            match service.process_daily_check() {
                Ok(stats) => log_outcome(&stats),
                Err(e) => tracing::error!("daily check failed: {e}"),
            }
        }
    }

    /// Run one sweep immediately, outside the daily cadence. Used for
    /// operational on-demand checks; logs the outcome like a scheduled
    /// tick and hands the stats back to the caller.
    pub fn run_check_now<P: MembershipProbe>(
        &self,
        service: &SubscriptionService<'_, P>,
    ) -> Result<CheckStats, StoreError> {
        tracing::info!("running subscription check on demand");
        let stats = service.process_daily_check()?;
        log_outcome(&stats);
        Ok(stats)
    }
}

fn log_outcome(stats: &CheckStats) {
    tracing::info!(
        checked = stats.checked,
        granted = stats.granted,
        deactivated = stats.deactivated,
        errors = stats.errors,
        "subscription check finished"
    );
}
