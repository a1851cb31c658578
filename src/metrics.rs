//! Observability metrics for stats runs
//!
//! Request traffic, cost consumption, rate limiting and job outcomes are
//! recorded through the `metrics` facade. Nothing is exported unless
//! [`init_metrics`] installed the Prometheus recorder; until then every
//! helper here is a no-op.
//!
//! ## Metrics
//!
//! - `ads_http_requests_total{method,status}` and `ads_http_request_duration_seconds`
//! - `ads_http_retries_total` and `ads_http_retry_backoff_seconds`
//! - `stats_jobs_submitted_total{entity,status}`
//! - `stats_rate_limited_total{operation}`
//! - `stats_request_cost_total`
//! - `stats_backoff_seconds`
//! - `stats_jobs_completed_total{outcome}`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fetcher::HttpMethod;
use crate::StatsEntity;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address of the scrape endpoint (e.g., "0.0.0.0:9090")
///
/// # Returns
/// Ok(()) if metrics initialized successfully, Err if binding fails
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "ads_http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the ads API"
    );

    describe_histogram!(
        "ads_http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );

    describe_counter!(
        "ads_http_retries_total",
        Unit::Count,
        "Requests retried after a network error"
    );

    describe_histogram!(
        "ads_http_retry_backoff_seconds",
        Unit::Seconds,
        "Wait before retrying a request after a network error"
    );

    describe_counter!(
        "stats_jobs_submitted_total",
        Unit::Count,
        "Stats job submissions by entity and response status"
    );

    describe_counter!(
        "stats_rate_limited_total",
        Unit::Count,
        "Responses with status 429 by operation"
    );

    describe_counter!(
        "stats_request_cost_total",
        Unit::Count,
        "Sum of x-request-cost over all submissions"
    );

    describe_histogram!(
        "stats_backoff_seconds",
        Unit::Seconds,
        "Wait for the cost budget to refill before the next submission"
    );

    describe_counter!(
        "stats_jobs_completed_total",
        Unit::Count,
        "Stats jobs that reached a terminal state, by outcome"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Path of a URL without origin or query, used as a low-cardinality label
fn endpoint_label(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    method: HttpMethod,
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(method: HttpMethod, url: &str, attempt: u32) -> Self {
        let endpoint = endpoint_label(url);
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            method = %method,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request metrics"
        );

        Self {
            method,
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "ads_http_requests_total",
            "method" => self.method.as_str(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "ads_http_request_duration_seconds",
            "method" => self.method.as_str(),
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "ads_http_requests_total",
            "method" => self.method.as_str(),
            "status" => "network_error",
        )
        .increment(1);

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "ads_http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("ads_http_retry_backoff_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record one stats job submission and its response status
pub fn record_submission(entity: StatsEntity, status: u16) {
    counter!(
        "stats_jobs_submitted_total",
        "entity" => entity.as_str(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a 429 response for `operation` (`submit` or `poll`)
pub fn record_rate_limited(operation: &'static str) {
    counter!("stats_rate_limited_total", "operation" => operation).increment(1);
}

/// Record the cost units charged for a submission
pub fn record_request_cost(cost: u64) {
    counter!("stats_request_cost_total").increment(cost);
}

/// Record a cost backoff before the next submission
pub fn record_cost_backoff(duration: Duration) {
    histogram!("stats_backoff_seconds").record(duration.as_secs_f64());
}

/// Record a job reaching a terminal state
pub fn record_job_outcome(outcome: &'static str) {
    counter!("stats_jobs_completed_total", "outcome" => outcome).increment(1);
}
