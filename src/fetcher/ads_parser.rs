//! Parsing of ads API response bodies
//!
//! Listing records, stats job submission responses and job status responses.

use serde::Deserialize;
use serde_json::Value;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::stats::job::JobStatus;
use crate::ParentField;

/// Listing record of any hierarchy tier
///
/// Timestamps are kept in their wire form and parsed while filtering, so a
/// malformed value is reported against the record that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct EntityRecord {
    /// Entity id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Flight start, if scheduled
    #[serde(default)]
    pub start_time: Option<String>,
    /// Flight end, if scheduled
    #[serde(default)]
    pub end_time: Option<String>,
    /// Whether the entity is deleted
    #[serde(default)]
    pub deleted: bool,
    /// Whether the entity is paused
    #[serde(default)]
    pub paused: bool,
    /// Last modification time
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Parent funding instrument (campaigns)
    #[serde(default)]
    pub funding_instrument_id: Option<String>,
    /// Parent campaign (line items)
    #[serde(default)]
    pub campaign_id: Option<String>,
    /// Parent line item (promoted tweets)
    #[serde(default)]
    pub line_item_id: Option<String>,
}

impl EntityRecord {
    /// Record with only an id set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Value of the given parent reference
    pub fn parent_id(&self, field: ParentField) -> Option<&str> {
        match field {
            ParentField::FundingInstrumentId => self.funding_instrument_id.as_deref(),
            ParentField::CampaignId => self.campaign_id.as_deref(),
            ParentField::LineItemId => self.line_item_id.as_deref(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Items of the `data` array of a listing page
///
/// An absent or null `data` yields no items.
pub fn parse_page_data(body: &Value) -> FetcherResult<Vec<Value>> {
    match body.get("data") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(FetcherError::InvalidResponse(format!(
            "expected data array, got {other}"
        ))),
    }
}

/// Cursor of the next page, if any
pub fn parse_next_cursor(body: &Value) -> Option<String> {
    match body.get("next_cursor")? {
        Value::String(cursor) if !cursor.is_empty() => Some(cursor.clone()),
        Value::Number(cursor) => Some(cursor.to_string()),
        _ => None,
    }
}

/// Job id from a stats job submission response
///
/// Prefers `data.id_str`, falling back to `data.id` (string or number).
pub fn parse_job_id(body: Option<&Value>) -> FetcherResult<String> {
    let data = body
        .and_then(|body| body.get("data"))
        .ok_or_else(|| FetcherError::InvalidResponse("job response has no data".to_string()))?;

    if let Some(Value::String(id)) = data.get("id_str") {
        return Ok(id.clone());
    }

    match data.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(FetcherError::InvalidResponse(format!(
            "job response has no id: {data}"
        ))),
    }
}

/// State of a polled job and its result URL if one is present
pub fn parse_job_status(body: Option<&Value>) -> FetcherResult<(JobStatus, Option<String>)> {
    let job = body
        .and_then(|body| body.get("data"))
        .and_then(|data| data.as_array())
        .and_then(|jobs| jobs.first())
        .ok_or_else(|| {
            FetcherError::InvalidResponse("job status response has no jobs".to_string())
        })?;

    let status = job
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| FetcherError::InvalidResponse(format!("job has no status: {job}")))?;

    let url = job
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((status.parse().unwrap_or(JobStatus::Pending), url))
}
