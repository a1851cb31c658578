//! Stats fetch command

use chrono::Utc;
use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clock::SystemClock;
use crate::credentials::{CredentialProvider, TwurlrcProvider};
use crate::fetcher::ads_http::{parse_header, AdsHttpClient};
use crate::run::{RunOptions, RunReport, StatsRun};
use crate::stats::config::{DEFAULT_API_ORIGIN, MAX_RETRIES};
use crate::stats::StatsConfig;
use crate::{TimeWindow, Verbosity};

use super::CliError;

/// Parse a `-A "Key: Value"` header argument
fn parse_header_arg(s: &str) -> Result<(String, String), String> {
    parse_header(s).ok_or_else(|| format!("'{s}' is not a header of the form 'Key: Value'"))
}

/// Parse and validate an API origin
fn parse_api_origin(s: &str) -> Result<String, String> {
    let parsed = url::Url::parse(s).map_err(|e| format!("'{s}' is not a valid URL: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("'{s}' must use http or https"));
    }
    Ok(s.trim_end_matches('/').to_string())
}

/// Check stats request cost for an ads account
///
/// Lists every funding instrument, campaign, line item and promoted tweet of
/// the account, keeps those active in the reporting window, and submits
/// stats jobs for the surviving line items and promoted tweets.
#[derive(Debug, Parser)]
#[command(name = "ads-stats-fetcher")]
#[command(about = "Fetch async stats for an ads account and report request cost", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Ads account id
    #[arg(short = 'a', long)]
    pub account: String,

    /// Extra request header, `Key: Value` (repeatable)
    #[arg(short = 'A', long = "header", value_parser = parse_header_arg)]
    pub headers: Vec<(String, String)>,

    /// Verbose output: job result URLs, segmentation types, average cost (`-vv` for very verbose)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Very verbose output: every stats query submitted
    #[arg(long, default_value_t = false)]
    pub very_verbose: bool,

    /// Also fetch every segmentation type
    #[arg(short = 's', long, default_value_t = false)]
    pub segmentation: bool,

    /// Metric groups, comma separated
    #[arg(
        short = 'm',
        long,
        value_delimiter = ',',
        default_value = "BILLING,ENGAGEMENT,VIDEO,MEDIA"
    )]
    pub metric_groups: Vec<String>,

    /// Placement
    #[arg(short = 'p', long, default_value = "ALL_ON_TWITTER")]
    pub placement: String,

    /// Length of the reporting window in days, ending now
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=365))]
    pub days: u32,

    /// Give up on a job after this many status polls (default: poll forever)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_poll_attempts: Option<u32>,

    /// Seconds between status polls of a running job
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub poll_interval_secs: u64,

    /// Maximum retry attempts for requests that got no response
    #[arg(long, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Profile store (default: ~/.twurlrc)
    #[arg(long, env = "TWURLRC")]
    pub twurlrc: Option<PathBuf>,

    /// Profile (username) to use instead of the store's default
    #[arg(long)]
    pub profile: Option<String>,

    /// API origin
    #[arg(long, default_value = DEFAULT_API_ORIGIN, value_parser = parse_api_origin)]
    pub api_origin: String,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Verbosity selected by the flags
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose > 0, self.very_verbose || self.verbose > 1)
    }

    /// Engine configuration from the flags
    ///
    /// # Errors
    /// Returns [`CliError::InvalidArgument`] for an empty metric group list or placement
    pub fn stats_config(&self) -> Result<StatsConfig, CliError> {
        let metric_groups: Vec<String> = self
            .metric_groups
            .iter()
            .map(|group| group.trim().to_uppercase())
            .filter(|group| !group.is_empty())
            .collect();
        if metric_groups.is_empty() {
            return Err(CliError::InvalidArgument(
                "at least one metric group is required".to_string(),
            ));
        }

        let placement = self.placement.trim();
        if placement.is_empty() {
            return Err(CliError::InvalidArgument(
                "placement must not be empty".to_string(),
            ));
        }

        Ok(StatsConfig::default()
            .with_api_origin(self.api_origin.as_str())
            .with_placement(placement.to_uppercase())
            .with_metric_groups(metric_groups)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_max_poll_attempts(self.max_poll_attempts)
            .with_verbosity(self.verbosity()))
    }

    /// Credential source selected by `--twurlrc` and `--profile`
    ///
    /// # Errors
    /// Returns [`CliError::ConfigurationError`] if no store path is given and
    /// the home directory cannot be determined
    pub fn credential_provider(&self) -> Result<TwurlrcProvider, CliError> {
        let provider = match &self.twurlrc {
            Some(path) => TwurlrcProvider::new(path),
            None => TwurlrcProvider::default_location()
                .map_err(|e| CliError::ConfigurationError(e.to_string()))?,
        };

        Ok(match &self.profile {
            Some(profile) => provider.with_profile(profile),
            None => provider,
        })
    }

    /// Execute the run and print the summary
    pub async fn execute(&self) -> Result<RunReport, CliError> {
        let config = self.stats_config()?;
        let account = self.account.trim();
        if account.is_empty() {
            return Err(CliError::InvalidArgument(
                "account id must not be empty".to_string(),
            ));
        }

        let provider = self.credential_provider()?;
        info!(path = ?provider.path(), "Loading credentials");
        let credentials = provider.credentials()?;

        let client = AdsHttpClient::new(credentials)?
            .with_extra_headers(self.headers.clone())
            .with_max_retries(self.max_retries);

        let run = StatsRun::new(Arc::new(client), Arc::new(SystemClock), config);
        let window = TimeWindow::trailing_days(Utc::now(), self.days);
        let options = RunOptions::new(account, window).with_segmentation(self.segmentation);

        let report = run.execute(&options).await?;
        println!("{}", report.render(self.verbosity()));
        Ok(report)
    }
}
