//! Stats job configuration constants

use std::time::Duration;

use crate::{SegmentationType, Verbosity};

/// Default API origin
pub const DEFAULT_API_ORIGIN: &str = "https://ads-api.twitter.com";

/// Maximum number of entity ids the API accepts in one stats job.
pub const BATCH_SIZE: usize = 20;

/// Wait between two polls of a job that is still running.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Placement queried when none is configured
pub const DEFAULT_PLACEMENT: &str = "ALL_ON_TWITTER";

/// Metric groups queried when none are configured
pub const DEFAULT_METRIC_GROUPS: [&str; 4] = ["BILLING", "ENGAGEMENT", "VIDEO", "MEDIA"];

/// Granularity of every stats job
pub const GRANULARITY: &str = "HOUR";

/// Segmentation types run when segmentation is enabled
pub const NON_SUB_PARAM_SEGMENTATION_TYPES: [SegmentationType; 5] = SegmentationType::NON_SUB_PARAM;

/// Maximum number of retries for requests that got no response (max total wait ~1 minute).
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
/// 30 seconds caps exponential backoff
/// (retry 5 = 32s capped to 30s, total max wait with 5 retries ~63s).
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// Settings shared by every stats job of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Scheme and host of the API
    pub api_origin: String,
    /// `placement` request parameter
    pub placement: String,
    /// `metric_groups` request parameter, in request order
    pub metric_groups: Vec<String>,
    /// Wait between polls of a running job
    pub poll_interval: Duration,
    /// Give up on a job after this many polls; `None` polls forever
    pub max_poll_attempts: Option<u32>,
    /// Per-query reporting detail
    pub verbosity: Verbosity,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            api_origin: DEFAULT_API_ORIGIN.to_string(),
            placement: DEFAULT_PLACEMENT.to_string(),
            metric_groups: DEFAULT_METRIC_GROUPS.iter().map(|g| g.to_string()).collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: None,
            verbosity: Verbosity::Normal,
        }
    }
}

impl StatsConfig {
    /// Set the API origin (trailing slashes are dropped)
    pub fn with_api_origin(mut self, origin: impl Into<String>) -> Self {
        self.api_origin = origin.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the placement
    pub fn with_placement(mut self, placement: impl Into<String>) -> Self {
        self.placement = placement.into();
        self
    }

    /// Set the metric groups
    pub fn with_metric_groups(mut self, groups: Vec<String>) -> Self {
        self.metric_groups = groups;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cap the number of polls per job
    pub fn with_max_poll_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    /// Set the verbosity
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_origin, path)
    }
}
