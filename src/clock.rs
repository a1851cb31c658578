//! Wall-clock access and sleeping.
//!
//! Every suspension point of a run (cost backoff, poll interval, poll
//! rate-limit waits) goes through a [`Clock`], so the engine can be driven
//! with virtual time in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of the current time and of sleeps
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the current task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by [`Utc::now`] and [`tokio::time::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Time left until a reset given as epoch seconds, zero if already passed
pub fn duration_until_epoch(now: DateTime<Utc>, reset_epoch: i64) -> Duration {
    let remaining = reset_epoch.saturating_sub(now.timestamp());
    Duration::from_secs(u64::try_from(remaining).unwrap_or(0))
}
