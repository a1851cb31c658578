//! Cost and rate-limit header handling
//!
//! Stats job submissions are charged in cost units. Every response reports
//! the cost of the request and, when the cost budget is exhausted, the epoch
//! second at which it refills. Job status polls use the plain request rate
//! limit instead.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use crate::clock::duration_until_epoch;
use crate::fetcher::ApiResponse;

/// Cost units charged for the request
pub const REQUEST_COST_HEADER: &str = "x-request-cost";
/// Cost units left in the current window
pub const COST_REMAINING_HEADER: &str = "x-cost-rate-limit-remaining";
/// Epoch second at which the cost window refills
pub const COST_RESET_HEADER: &str = "x-cost-rate-limit-reset";
/// Epoch second at which the request rate limit resets
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
/// Epoch second after which a timed-out request may be retried
pub const RETRY_AFTER_HEADER: &str = "x-retry-after";

/// HTTP 200
pub const STATUS_OK: u16 = 200;
/// HTTP 429
pub const STATUS_RATE_LIMITED: u16 = 429;
/// HTTP 503
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Cost headers of a stats job submission response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostHeaders {
    /// `x-request-cost`
    pub request_cost: Option<u64>,
    /// `x-cost-rate-limit-remaining`
    pub remaining: Option<i64>,
    /// `x-cost-rate-limit-reset`
    pub reset_epoch: Option<i64>,
}

impl CostHeaders {
    /// Read the cost headers of a response
    pub fn from_response(response: &ApiResponse) -> Self {
        let request_cost = response.header(REQUEST_COST_HEADER).and_then(|raw| {
            match raw.trim().parse::<u64>() {
                Ok(cost) => Some(cost),
                Err(e) => {
                    warn!("Ignoring invalid {} header '{}': {}", REQUEST_COST_HEADER, raw, e);
                    None
                }
            }
        });

        Self {
            request_cost,
            remaining: response.header_i64(COST_REMAINING_HEADER),
            reset_epoch: response.header_i64(COST_RESET_HEADER),
        }
    }

    /// Wait before the next submission
    ///
    /// Only a costed, rate-limited response that also reports an exhausted
    /// cost budget yields a wait, lasting until the budget refills.
    pub fn backoff(&self, status: u16, now: DateTime<Utc>) -> Option<Duration> {
        if self.request_cost.is_none() {
            return None;
        }
        if status != STATUS_RATE_LIMITED || self.remaining != Some(0) {
            return None;
        }
        self.reset_epoch
            .map(|reset| duration_until_epoch(now, reset))
    }
}

/// Wait before re-polling after a 429, from `x-rate-limit-reset`
pub fn poll_rate_limit_wait(response: &ApiResponse, now: DateTime<Utc>) -> Option<Duration> {
    response
        .header_i64(RATE_LIMIT_RESET_HEADER)
        .map(|reset| duration_until_epoch(now, reset))
}

/// Wait before re-polling after a 503, from `x-retry-after`
pub fn poll_retry_after_wait(response: &ApiResponse, now: DateTime<Utc>) -> Option<Duration> {
    response
        .header_i64(RETRY_AFTER_HEADER)
        .map(|retry_at| duration_until_epoch(now, retry_at))
}
