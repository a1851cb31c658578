//! Stats job submission and polling
//!
//! This module provides the engine that turns a list of entity ids into
//! asynchronous stats jobs while staying inside the API's cost budget.
//!
//! # Overview
//!
//! 1. **Batching**: ids are queued and submitted [`config::BATCH_SIZE`] at a time
//! 2. **Cost tracking**: `x-request-cost` of every submission is summed
//! 3. **Backoff**: an exhausted cost budget delays the next submission until it refills
//! 4. **Requeue**: batches answered with 429 or 503 go back to the end of the queue
//! 5. **Polling**: every accepted job is polled until it succeeds or fails
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ads_stats_fetcher::clock::SystemClock;
//! use ads_stats_fetcher::credentials::Credentials;
//! use ads_stats_fetcher::fetcher::ads_http::AdsHttpClient;
//! use ads_stats_fetcher::stats::{StatsConfig, StatsJobEngine};
//! use ads_stats_fetcher::{StatsEntity, TimeWindow};
//! use chrono::Utc;
//!
//! # async fn example(credentials: Credentials) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(AdsHttpClient::new(credentials)?);
//! let engine = StatsJobEngine::new(transport, Arc::new(SystemClock), StatsConfig::default());
//!
//! let window = TimeWindow::trailing_days(Utc::now(), 7);
//! let ids = vec!["4n4zz".to_string(), "4n502".to_string()];
//! let outcome = engine
//!     .run("18ce54d4x5t", StatsEntity::LineItem, &window, &ids, None)
//!     .await?;
//! println!("{} queries, cost {}", outcome.query_count, outcome.cost_total);
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`executor`] - Submission loop and job status poller
//! - [`job`] - Request, status and outcome types
//! - [`rate_limit`] - Cost and rate-limit header handling
//! - [`config`] - Constants, backoff calculation and [`StatsConfig`]

pub mod config;
pub mod executor;
pub mod job;
pub mod rate_limit;

pub use config::StatsConfig;
pub use executor::StatsJobEngine;
pub use job::{JobOutcome, JobStatus, StatsJobRequest, StatsOutcome};

use crate::fetcher::FetcherError;

/// Stats job errors
///
/// Every variant aborts the run; rate limits and timeouts that the engine
/// can recover from never surface here.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// Transport or response parsing error
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Status with no recovery path
    #[error("{operation} failed with status {status}: headers [{headers}] body {body}")]
    UnexpectedStatus {
        /// Which call failed (`submit` or `poll`)
        operation: &'static str,
        /// HTTP status code
        status: u16,
        /// Response headers, rendered
        headers: String,
        /// Response body, rendered
        body: String,
    },

    /// Job poll timed out without a retry time
    #[error("job {job_id} status unavailable and no retry time given: headers [{headers}] body {body}")]
    ServiceUnavailable {
        /// Polled job
        job_id: String,
        /// Response headers, rendered
        headers: String,
        /// Response body, rendered
        body: String,
    },

    /// Job did not finish within the configured number of polls
    #[error("job {job_id} still running after {attempts} polls")]
    PollAttemptsExhausted {
        /// Polled job
        job_id: String,
        /// Polls made
        attempts: u32,
    },
}

/// Result type for stats operations
pub type StatsResult<T> = Result<T, StatsError>;
