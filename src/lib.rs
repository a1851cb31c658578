//! # Ads Stats Fetcher Library
//!
//! A batch client for the asynchronous statistics-job workflow of an
//! advertising analytics API. Given an ads account it walks the campaign
//! hierarchy, keeps the entities that were active in a time window, and
//! submits stats jobs for them while tracking request cost and rate limits.
//!
//! ## Features
//!
//! - **Cursor Pagination**: Drains every page of the listing endpoints
//! - **Hierarchy Filtering**: Funding instruments → campaigns → line items → promoted tweets
//! - **Cost-Aware Backoff**: Honours `x-cost-rate-limit-*` headers between batches
//! - **Job Polling**: Polls submitted jobs until they succeed or fail
//! - **OAuth 1.0a**: Signs every request with credentials from a twurl profile store
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ads_stats_fetcher::clock::SystemClock;
//! use ads_stats_fetcher::credentials::{CredentialProvider, TwurlrcProvider};
//! use ads_stats_fetcher::fetcher::ads_http::AdsHttpClient;
//! use ads_stats_fetcher::run::{RunOptions, StatsRun};
//! use ads_stats_fetcher::stats::StatsConfig;
//! use ads_stats_fetcher::TimeWindow;
//! use chrono::Utc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = TwurlrcProvider::default_location()?.credentials()?;
//! let transport = Arc::new(AdsHttpClient::new(credentials)?);
//! let run = StatsRun::new(transport, Arc::new(SystemClock), StatsConfig::default());
//!
//! let window = TimeWindow::trailing_days(Utc::now(), 60);
//! let report = run.execute(&RunOptions::new("18ce54d4x5t", window)).await?;
//! println!("total cost: {}", report.totals.request_cost);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`credentials`] - Profile store loading (consumer key/secret, token/secret)
//! - [`fetcher`] - Transport trait, signed HTTP client, pagination and response parsing
//! - [`filter`] - Time-window and parent allow-list filtering of entity records
//! - [`stats`] - Stats job submission, cost backoff and job polling
//! - [`run`] - Orchestration of a full account run
//! - [`clock`] - Wall clock and sleeping, injectable for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};

/// CLI command implementations
pub mod cli;

/// Wall clock and suspension points
pub mod clock;

/// Credential provider for request signing
pub mod credentials;

/// HTTP transport, pagination and parsing
pub mod fetcher;

/// Entity filtering by time window and parent ids
pub mod filter;

/// Observability metrics
pub mod metrics;

/// Run orchestration across the entity hierarchy
pub mod run;

/// Stats job engine
pub mod stats;

pub use fetcher::ads_parser::EntityRecord;
pub use run::{RunTotals, StatsRun};

/// Timestamp format used by the API for entity fields and stats windows
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse a timestamp in the fixed `YYYY-MM-DDTHH:MM:SSZ` wire format
pub fn parse_wire_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, WIRE_TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Render a timestamp in the wire format
pub fn format_wire_timestamp(value: &DateTime<Utc>) -> String {
    value.format(WIRE_TIMESTAMP_FORMAT).to_string()
}

/// Reporting window, both bounds truncated to the hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window from explicit bounds
    ///
    /// Both bounds are truncated to the hour. Fails if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        let start = truncate_to_hour(start);
        let end = truncate_to_hour(end);

        if start > end {
            return Err(format!(
                "Window start ({}) must not be after end ({})",
                format_wire_timestamp(&start),
                format_wire_timestamp(&end)
            ));
        }

        Ok(Self { start, end })
    }

    /// Window covering the `days` preceding `now`
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        let end = truncate_to_hour(now);
        let start = truncate_to_hour(now - Duration::days(i64::from(days)));
        Self { start, end }
    }

    /// Window start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Window end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Window start in wire format
    pub fn start_wire(&self) -> String {
        format_wire_timestamp(&self.start)
    }

    /// Window end in wire format
    pub fn end_wire(&self) -> String {
        format_wire_timestamp(&self.end)
    }
}

fn truncate_to_hour(value: DateTime<Utc>) -> DateTime<Utc> {
    // Only fails for out-of-range timestamps, which chrono cannot produce here.
    value.duration_trunc(Duration::hours(1)).unwrap_or(value)
}

/// Parent reference field used to join a tier to the one above it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentField {
    /// `funding_instrument_id` on campaigns
    FundingInstrumentId,
    /// `campaign_id` on line items
    CampaignId,
    /// `line_item_id` on promoted tweets
    LineItemId,
}

impl ParentField {
    /// Field name as it appears in listing records
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentField::FundingInstrumentId => "funding_instrument_id",
            ParentField::CampaignId => "campaign_id",
            ParentField::LineItemId => "line_item_id",
        }
    }
}

impl std::fmt::Display for ParentField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity tiers listed under an ads account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Funding instruments (top of the hierarchy)
    FundingInstruments,
    /// Campaigns, parented by funding instruments
    Campaigns,
    /// Line items, parented by campaigns
    LineItems,
    /// Promoted tweets, parented by line items
    PromotedTweets,
}

impl EntityKind {
    /// All tiers, parents first
    pub const HIERARCHY: [EntityKind; 4] = [
        EntityKind::FundingInstruments,
        EntityKind::Campaigns,
        EntityKind::LineItems,
        EntityKind::PromotedTweets,
    ];

    /// Path segment of the listing endpoint
    pub fn resource(&self) -> &'static str {
        match self {
            EntityKind::FundingInstruments => "funding_instruments",
            EntityKind::Campaigns => "campaigns",
            EntityKind::LineItems => "line_items",
            EntityKind::PromotedTweets => "promoted_tweets",
        }
    }

    /// Field pointing at the parent tier, if any
    pub fn parent_field(&self) -> Option<ParentField> {
        match self {
            EntityKind::FundingInstruments => None,
            EntityKind::Campaigns => Some(ParentField::FundingInstrumentId),
            EntityKind::LineItems => Some(ParentField::CampaignId),
            EntityKind::PromotedTweets => Some(ParentField::LineItemId),
        }
    }

    /// Listing path including deleted entities, one page of up to 1000 records
    pub fn listing_path(&self, account_id: &str) -> String {
        format!(
            "/1/accounts/{account_id}/{}?with_deleted=true&count=1000",
            self.resource()
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource())
    }
}

/// Entity type a stats job reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsEntity {
    /// Line item stats
    LineItem,
    /// Promoted tweet stats
    PromotedTweet,
}

impl StatsEntity {
    /// Value of the `entity` request parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsEntity::LineItem => "LINE_ITEM",
            StatsEntity::PromotedTweet => "PROMOTED_TWEET",
        }
    }
}

impl std::fmt::Display for StatsEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segmentation types that need no extra sub-parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationType {
    /// Segment by platform
    Platforms,
    /// Segment by location
    Locations,
    /// Segment by gender
    Gender,
    /// Segment by interest
    Interests,
    /// Segment by keyword
    Keywords,
}

impl SegmentationType {
    /// Every segmentation type that is queried when segmentation is enabled
    pub const NON_SUB_PARAM: [SegmentationType; 5] = [
        SegmentationType::Platforms,
        SegmentationType::Locations,
        SegmentationType::Gender,
        SegmentationType::Interests,
        SegmentationType::Keywords,
    ];

    /// Value of the `segmentation_type` request parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationType::Platforms => "PLATFORMS",
            SegmentationType::Locations => "LOCATIONS",
            SegmentationType::Gender => "GENDER",
            SegmentationType::Interests => "INTERESTS",
            SegmentationType::Keywords => "KEYWORDS",
        }
    }
}

impl std::fmt::Display for SegmentationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much per-query detail a run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Totals only
    #[default]
    Normal,
    /// Adds job result URLs, segmentation types and average cost
    Verbose,
    /// Adds every stats query submitted
    VeryVerbose,
}

impl Verbosity {
    /// Build from the two CLI flags; the stronger flag wins
    pub fn from_flags(verbose: bool, very_verbose: bool) -> Self {
        if very_verbose {
            Verbosity::VeryVerbose
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Whether verbose details are enabled
    pub fn is_verbose(&self) -> bool {
        *self >= Verbosity::Verbose
    }

    /// Whether per-query details are enabled
    pub fn is_very_verbose(&self) -> bool {
        *self == Verbosity::VeryVerbose
    }
}
