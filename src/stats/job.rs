//! Stats job structures and status tracking

use std::convert::Infallible;
use std::str::FromStr;

use crate::stats::config::{StatsConfig, GRANULARITY};
use crate::{SegmentationType, StatsEntity, TimeWindow};

/// One stats job submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsJobRequest {
    /// Entity type reported on
    pub entity: StatsEntity,
    /// Window start in wire format
    pub start_time: String,
    /// Window end in wire format
    pub end_time: String,
    /// Placement
    pub placement: String,
    /// Metric groups, in request order
    pub metric_groups: Vec<String>,
    /// Entity ids of this batch
    pub entity_ids: Vec<String>,
    /// Optional segmentation
    pub segmentation: Option<SegmentationType>,
}

impl StatsJobRequest {
    /// Build a request for one batch
    pub fn new(
        config: &StatsConfig,
        entity: StatsEntity,
        window: &TimeWindow,
        entity_ids: Vec<String>,
        segmentation: Option<SegmentationType>,
    ) -> Self {
        Self {
            entity,
            start_time: window.start_wire(),
            end_time: window.end_wire(),
            placement: config.placement.clone(),
            metric_groups: config.metric_groups.clone(),
            entity_ids,
            segmentation,
        }
    }

    /// Form parameters of the POST body
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("entity".to_string(), self.entity.to_string()),
            ("granularity".to_string(), GRANULARITY.to_string()),
            ("start_time".to_string(), self.start_time.clone()),
            ("end_time".to_string(), self.end_time.clone()),
            ("placement".to_string(), self.placement.clone()),
            ("metric_groups".to_string(), self.metric_groups.join(",")),
            ("entity_ids".to_string(), self.entity_ids.join(",")),
        ];

        if let Some(segmentation) = self.segmentation {
            params.push(("segmentation_type".to_string(), segmentation.to_string()));
        }

        params
    }
}

/// Server-side state of a stats job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued or running
    Pending,
    /// Finished, results available
    Success,
    /// Finished without results
    Failed,
    /// Any state this client does not know; treated as still running
    Other(String),
}

impl JobStatus {
    /// Whether polling can stop
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => JobStatus::Pending,
            "SUCCESS" => JobStatus::Success,
            "FAILED" => JobStatus::Failed,
            other => JobStatus::Other(other.to_string()),
        })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => f.write_str("PENDING"),
            JobStatus::Success => f.write_str("SUCCESS"),
            JobStatus::Failed => f.write_str("FAILED"),
            JobStatus::Other(state) => f.write_str(state),
        }
    }
}

/// Terminal result of polling one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job finished; `url` points at the result file when the API returns one
    Succeeded {
        /// Result location
        url: Option<String>,
    },
    /// Job failed server-side
    Failed,
}

/// Counters returned by one engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsOutcome {
    /// Successful job submissions
    pub query_count: u64,
    /// Sum of `x-request-cost` over all submissions
    pub cost_total: u64,
    /// Submissions answered with 429
    pub rate_limited_query_count: u64,
    /// Submitted jobs that ended in `FAILED`
    pub failed_job_count: u64,
}
