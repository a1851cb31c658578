//! Full account run: verify, list, filter, submit
//!
//! [`StatsRun::execute`] walks the entity hierarchy top-down. Each tier is
//! fetched in full, filtered against the window and the survivors of its
//! parent tier, and the surviving line items and promoted tweets are handed
//! to the [`StatsJobEngine`].

use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::clock::Clock;
use crate::fetcher::ads_parser::EntityRecord;
use crate::fetcher::pagination::fetch_all;
use crate::fetcher::{FetcherError, HttpMethod, Transport};
use crate::filter::{filter_entities, FilterError, ParentFilter};
use crate::stats::config::NON_SUB_PARAM_SEGMENTATION_TYPES;
use crate::stats::{StatsConfig, StatsError, StatsJobEngine, StatsOutcome};
use crate::{EntityKind, StatsEntity, TimeWindow, Verbosity};

/// Run errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Account lookup returned no data
    #[error("could not locate account {0}")]
    AccountNotFound(String),

    /// Account lookup or listing failed
    #[error(transparent)]
    Fetcher(#[from] FetcherError),

    /// Entity record could not be evaluated
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Stats job failed
    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Result type for run operations
pub type RunResult<T> = Result<T, RunError>;

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Ads account id
    pub account_id: String,
    /// Reporting window
    pub window: TimeWindow,
    /// Also run every segmentation type
    pub segmentation: bool,
}

impl RunOptions {
    /// Unsegmented run of `account_id` over `window`
    pub fn new(account_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            account_id: account_id.into(),
            window,
            segmentation: false,
        }
    }

    /// Enable or disable segmentation runs
    pub fn with_segmentation(mut self, segmentation: bool) -> Self {
        self.segmentation = segmentation;
        self
    }
}

/// Accumulated counters of every engine call in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunTotals {
    /// Successful job submissions
    pub query_count: u64,
    /// Total request cost
    pub request_cost: u64,
    /// Submissions answered with 429
    pub rate_limited_query_count: u64,
    /// Successful submissions of segmentation runs
    pub segmented_query_count: u64,
    /// Request cost of segmentation runs
    pub segmented_request_cost: u64,
    /// Jobs that ended in `FAILED`
    pub failed_job_count: u64,
}

impl RunTotals {
    /// Fold one engine outcome into the totals
    pub fn absorb(&mut self, outcome: &StatsOutcome, segmented: bool) {
        self.query_count += outcome.query_count;
        self.request_cost += outcome.cost_total;
        self.rate_limited_query_count += outcome.rate_limited_query_count;
        self.failed_job_count += outcome.failed_job_count;
        if segmented {
            self.segmented_query_count += outcome.query_count;
            self.segmented_request_cost += outcome.cost_total;
        }
    }

    /// Cost of the unsegmented runs
    pub fn unsegmented_request_cost(&self) -> u64 {
        self.request_cost - self.segmented_request_cost
    }

    /// Mean cost per successful submission, `None` before the first one
    pub fn average_cost_per_query(&self) -> Option<f64> {
        if self.query_count == 0 {
            return None;
        }
        Some(self.request_cost as f64 / self.query_count as f64)
    }
}

/// Record counts of one hierarchy tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCount {
    /// Tier
    pub kind: EntityKind,
    /// Records listed
    pub fetched: usize,
    /// Records that survived filtering
    pub active: usize,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Account run
    pub account_id: String,
    /// Reporting window
    pub window: TimeWindow,
    /// Whether segmentation runs were made
    pub segmentation: bool,
    /// Per-tier counts, parents first
    pub tiers: Vec<TierCount>,
    /// Accumulated counters
    pub totals: RunTotals,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl RunReport {
    /// Counts of one tier
    pub fn tier(&self, kind: EntityKind) -> Option<&TierCount> {
        self.tiers.iter().find(|tier| tier.kind == kind)
    }

    /// Human-readable summary
    pub fn render(&self, verbosity: Verbosity) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Account:\t\t\t{}", self.account_id);
        let _ = writeln!(out, "Start time:\t\t\t{}", self.window.start_wire());
        let _ = writeln!(out, "End time:\t\t\t{}", self.window.end_wire());
        for tier in &self.tiers {
            let _ = writeln!(
                out,
                "{}:\t{} fetched, {} active",
                tier.kind, tier.fetched, tier.active
            );
        }

        let totals = &self.totals;
        if self.segmentation {
            let _ = writeln!(
                out,
                "Non-Seg Stats Req Cost:\t\t{}",
                totals.unsegmented_request_cost()
            );
            let _ = writeln!(
                out,
                "Segmented Stats Req Cost:\t{}",
                totals.segmented_request_cost
            );
        }
        let _ = writeln!(out, "Total Stats Queries:\t\t{}", totals.query_count);
        let _ = writeln!(out, "Total Stats Request Cost:\t{}", totals.request_cost);
        if verbosity.is_verbose() {
            if let Some(average) = totals.average_cost_per_query() {
                let _ = writeln!(out, "Avg Cost per Query:\t\t{average:.2}");
            }
        }
        let _ = writeln!(
            out,
            "Queries Rate Limited:\t\t{}",
            totals.rate_limited_query_count
        );
        if totals.failed_job_count > 0 {
            let _ = writeln!(out, "Failed Jobs:\t\t\t{}", totals.failed_job_count);
        }
        let _ = write!(out, "Time elapsed:\t\t\t{:.1}s", self.elapsed.as_secs_f64());
        out
    }
}

/// Orchestrates a full account run
pub struct StatsRun {
    transport: Arc<dyn Transport>,
    engine: StatsJobEngine,
}

impl StatsRun {
    /// Create a run over `transport`
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, config: StatsConfig) -> Self {
        let engine = StatsJobEngine::new(transport.clone(), clock, config);
        Self { transport, engine }
    }

    fn config(&self) -> &StatsConfig {
        self.engine.config()
    }

    /// Execute the run
    ///
    /// # Errors
    /// Returns [`RunError::AccountNotFound`] when the account lookup has no
    /// data; any fetch, filter or stats error aborts the run.
    pub async fn execute(&self, options: &RunOptions) -> RunResult<RunReport> {
        let started = Instant::now();
        let account_id = options.account_id.as_str();

        info!(
            account_id = %account_id,
            start_time = %options.window.start_wire(),
            end_time = %options.window.end_wire(),
            "Stats check for account"
        );

        self.verify_account(account_id).await?;

        let mut tiers = Vec::with_capacity(EntityKind::HIERARCHY.len());
        let mut line_items = Vec::new();
        let mut promoted_tweets = Vec::new();
        let mut parents: Option<HashSet<String>> = None;

        for kind in EntityKind::HIERARCHY {
            let url = self.config().url(&kind.listing_path(account_id));
            let records: Vec<EntityRecord> = fetch_all(self.transport.as_ref(), &url).await?;

            let parent = match (kind.parent_field(), parents.as_ref()) {
                (Some(field), Some(allowed)) => Some(ParentFilter::new(field, allowed)),
                _ => None,
            };
            let active = filter_entities(&records, &options.window, parent)?;

            info!(
                account_id = %account_id,
                entity = %kind,
                fetched = records.len(),
                active = active.len(),
                "Filtered entities"
            );
            tiers.push(TierCount {
                kind,
                fetched: records.len(),
                active: active.len(),
            });

            parents = Some(active.iter().cloned().collect());
            match kind {
                EntityKind::LineItems => line_items = active,
                EntityKind::PromotedTweets => promoted_tweets = active,
                _ => {}
            }
        }

        let groups = [
            (StatsEntity::LineItem, line_items),
            (StatsEntity::PromotedTweet, promoted_tweets),
        ];
        let mut totals = RunTotals::default();

        for (entity, ids) in groups.iter().filter(|(_, ids)| !ids.is_empty()) {
            info!(entity = %entity, count = ids.len(), "Fetching stats");
            let outcome = self
                .engine
                .run(account_id, *entity, &options.window, ids, None)
                .await?;
            totals.absorb(&outcome, false);
        }

        if options.segmentation {
            for (entity, ids) in groups.iter().filter(|(_, ids)| !ids.is_empty()) {
                info!(entity = %entity, count = ids.len(), "Fetching segmentation stats");
                for segmentation in NON_SUB_PARAM_SEGMENTATION_TYPES {
                    let outcome = self
                        .engine
                        .run(account_id, *entity, &options.window, ids, Some(segmentation))
                        .await?;
                    totals.absorb(&outcome, true);
                }
            }
        }

        Ok(RunReport {
            account_id: account_id.to_string(),
            window: options.window,
            segmentation: options.segmentation,
            tiers,
            totals,
            elapsed: started.elapsed(),
        })
    }

    async fn verify_account(&self, account_id: &str) -> RunResult<()> {
        let url = self.config().url(&format!("/1/accounts/{account_id}"));
        let response = self.transport.send(HttpMethod::Get, &url, &[]).await?;

        if !response.is_success() {
            return Err(FetcherError::UnexpectedStatus {
                status: response.status,
                url,
                body: response.body_text(),
            }
            .into());
        }

        let found = match response.body.as_ref().and_then(|body| body.get("data")) {
            None | Some(Value::Null) => false,
            Some(Value::Object(data)) => !data.is_empty(),
            Some(Value::Array(data)) => !data.is_empty(),
            Some(_) => true,
        };
        if !found {
            return Err(RunError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }
}
