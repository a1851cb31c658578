//! Stats job engine: batch submission with cost backoff and job polling

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::fetcher::ads_parser::{parse_job_id, parse_job_status};
use crate::fetcher::{HttpMethod, Transport};
use crate::metrics::{
    record_cost_backoff, record_job_outcome, record_rate_limited, record_request_cost,
    record_submission,
};
use crate::stats::config::{StatsConfig, BATCH_SIZE};
use crate::stats::job::{JobOutcome, JobStatus, StatsJobRequest, StatsOutcome};
use crate::stats::rate_limit::{
    poll_rate_limit_wait, poll_retry_after_wait, CostHeaders, STATUS_OK, STATUS_RATE_LIMITED,
    STATUS_SERVICE_UNAVAILABLE,
};
use crate::stats::{StatsError, StatsResult};
use crate::{SegmentationType, StatsEntity, TimeWindow};

/// Submits stats jobs for batches of entities and waits for each to finish
///
/// Batches are processed strictly one after another; a job is polled to a
/// terminal state before the next batch is submitted.
pub struct StatsJobEngine {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: StatsConfig,
}

impl StatsJobEngine {
    /// Create an engine
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, config: StatsConfig) -> Self {
        Self {
            transport,
            clock,
            config,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Run stats jobs for every id in `entity_ids`
    ///
    /// Ids are drained front to back in batches of at most [`BATCH_SIZE`].
    /// A batch answered with 429 or 503 is appended to the back of the
    /// queue and retried; there is no retry limit.
    ///
    /// # Errors
    /// Any status other than 200, 429 or 503, a transport error, or a poll
    /// failure aborts the run
    pub async fn run(
        &self,
        account_id: &str,
        entity: StatsEntity,
        window: &TimeWindow,
        entity_ids: &[String],
        segmentation: Option<SegmentationType>,
    ) -> StatsResult<StatsOutcome> {
        let url = self
            .config
            .url(&format!("/1/stats/jobs/accounts/{account_id}"));
        let mut queue: VecDeque<String> = entity_ids.iter().cloned().collect();
        let mut outcome = StatsOutcome::default();
        let mut pending_backoff: Option<Duration> = None;

        info!(
            account_id = %account_id,
            entity = %entity,
            entities = queue.len(),
            segmentation = ?segmentation,
            "Fetching stats"
        );

        while !queue.is_empty() {
            if let Some(backoff) = pending_backoff.take() {
                info!(backoff_secs = backoff.as_secs(), "Cost limit exhausted, sleeping");
                record_cost_backoff(backoff);
                self.clock.sleep(backoff).await;
            }

            let batch_len = queue.len().min(BATCH_SIZE);
            let batch: Vec<String> = queue.drain(..batch_len).collect();
            let request = StatsJobRequest::new(&self.config, entity, window, batch, segmentation);

            if self.config.verbosity.is_very_verbose() {
                info!(
                    url = %url,
                    entity_ids = %request.entity_ids.join(","),
                    "Stats query"
                );
            }

            let response = self
                .transport
                .send(HttpMethod::Post, &url, &request.to_params())
                .await?;
            record_submission(entity, response.status);

            let cost = CostHeaders::from_response(&response);
            if let Some(request_cost) = cost.request_cost {
                outcome.cost_total += request_cost;
                record_request_cost(request_cost);
            }
            if let Some(backoff) = cost.backoff(response.status, self.clock.now()) {
                pending_backoff = Some(backoff);
            }

            match response.status {
                STATUS_OK => {
                    outcome.query_count += 1;
                    let job_id = parse_job_id(response.body.as_ref())?;
                    debug!(job_id = %job_id, batch_size = request.entity_ids.len(), "Job submitted");

                    if self.poll_job(account_id, &job_id).await? == JobOutcome::Failed {
                        outcome.failed_job_count += 1;
                    }
                }
                STATUS_RATE_LIMITED => {
                    warn!(
                        batch_size = request.entity_ids.len(),
                        "Rate limited, adding entities back to queue"
                    );
                    outcome.rate_limited_query_count += 1;
                    record_rate_limited("submit");
                    queue.extend(request.entity_ids);
                }
                STATUS_SERVICE_UNAVAILABLE => {
                    warn!(
                        batch_size = request.entity_ids.len(),
                        url = %url,
                        "Timeout, adding entities back to queue"
                    );
                    queue.extend(request.entity_ids);
                }
                status => {
                    return Err(StatsError::UnexpectedStatus {
                        operation: "submit",
                        status,
                        headers: response.headers_text(),
                        body: response.body_text(),
                    });
                }
            }
        }

        if let Some(segmentation) = segmentation {
            if self.config.verbosity.is_verbose() {
                info!(segmentation = %segmentation, entity = %entity, "Segmentation run complete");
            }
        }

        Ok(outcome)
    }

    /// Poll a job until it reaches `SUCCESS` or `FAILED`
    ///
    /// Running jobs are re-polled every [`StatsConfig::poll_interval`]. A 429
    /// waits for `x-rate-limit-reset`, a 503 for `x-retry-after`.
    ///
    /// # Errors
    /// A 503 without `x-retry-after`, any other non-200 status, or exceeding
    /// [`StatsConfig::max_poll_attempts`]
    pub async fn poll_job(&self, account_id: &str, job_id: &str) -> StatsResult<JobOutcome> {
        let url = self
            .config
            .url(&format!("/1/stats/jobs/accounts/{account_id}?job_ids={job_id}"));
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            debug!(job_id = %job_id, attempt = attempts, "Polling job status");
            let response = self.transport.send(HttpMethod::Get, &url, &[]).await?;

            let wait = match response.status {
                STATUS_OK => {
                    let (status, result_url) = parse_job_status(response.body.as_ref())?;
                    if status.is_terminal() {
                        return Ok(self.finish_job(job_id, status, result_url));
                    }
                    debug!(job_id = %job_id, status = %status, "Waiting for job to complete");
                    self.config.poll_interval
                }
                STATUS_RATE_LIMITED => {
                    let wait = poll_rate_limit_wait(&response, self.clock.now())
                        .unwrap_or(self.config.poll_interval);
                    warn!(
                        job_id = %job_id,
                        backoff_secs = wait.as_secs(),
                        "Rate limited, waiting to requery status"
                    );
                    record_rate_limited("poll");
                    wait
                }
                STATUS_SERVICE_UNAVAILABLE => {
                    let Some(wait) = poll_retry_after_wait(&response, self.clock.now()) else {
                        return Err(StatsError::ServiceUnavailable {
                            job_id: job_id.to_string(),
                            headers: response.headers_text(),
                            body: response.body_text(),
                        });
                    };
                    warn!(
                        job_id = %job_id,
                        backoff_secs = wait.as_secs(),
                        "Timeout, waiting to requery status"
                    );
                    wait
                }
                status => {
                    return Err(StatsError::UnexpectedStatus {
                        operation: "poll",
                        status,
                        headers: response.headers_text(),
                        body: response.body_text(),
                    });
                }
            };

            if let Some(max_attempts) = self.config.max_poll_attempts {
                if attempts >= max_attempts {
                    return Err(StatsError::PollAttemptsExhausted {
                        job_id: job_id.to_string(),
                        attempts,
                    });
                }
            }
            self.clock.sleep(wait).await;
        }
    }

    /// Log and record a job that reached `SUCCESS` or `FAILED`
    fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        result_url: Option<String>,
    ) -> JobOutcome {
        if status == JobStatus::Failed {
            warn!(job_id = %job_id, "Job failed");
            record_job_outcome("failed");
            return JobOutcome::Failed;
        }

        info!(job_id = %job_id, "Job completed");
        if self.config.verbosity.is_verbose() {
            if let Some(result_url) = &result_url {
                info!(job_id = %job_id, url = %result_url, "Job result");
            }
        }
        record_job_outcome("success");
        JobOutcome::Succeeded { url: result_url }
    }
}
