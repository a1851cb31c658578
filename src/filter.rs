//! Entity filtering against a reporting window
//!
//! A record is dropped, first match wins, when it:
//! 1. ended before the window starts,
//! 2. starts after the window ends,
//! 3. was deleted before the window starts,
//! 4. was paused before the window starts,
//! 5. points at a parent that did not survive its own filtering.
//!
//! Surviving ids keep their input order.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::fetcher::ads_parser::EntityRecord;
use crate::{parse_wire_timestamp, ParentField, TimeWindow};

/// Filtering errors
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// Timestamp not in `YYYY-MM-DDTHH:MM:SSZ` form
    #[error("malformed {field} on entity {id}: {value:?}")]
    MalformedTimestamp {
        /// Entity id
        id: String,
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// A field needed to decide the record is absent
    #[error("entity {id} has no {field}")]
    MissingField {
        /// Entity id
        id: String,
        /// Field name
        field: &'static str,
    },
}

/// Parent allow-list constraint
#[derive(Debug, Clone, Copy)]
pub struct ParentFilter<'a> {
    /// Reference field on the child record
    pub field: ParentField,
    /// Ids of the parents that survived
    pub allowed: &'a HashSet<String>,
}

impl<'a> ParentFilter<'a> {
    /// Constrain `field` to `allowed`
    pub fn new(field: ParentField, allowed: &'a HashSet<String>) -> Self {
        Self { field, allowed }
    }

    fn admits(&self, record: &EntityRecord) -> bool {
        record
            .parent_id(self.field)
            .is_some_and(|parent| self.allowed.contains(parent))
    }
}

fn parse_field(
    record: &EntityRecord,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, FilterError> {
    match value {
        None => Ok(None),
        Some(raw) => parse_wire_timestamp(raw)
            .map(Some)
            .map_err(|_| FilterError::MalformedTimestamp {
                id: record.id.clone(),
                field,
                value: raw.to_string(),
            }),
    }
}

fn updated_before(record: &EntityRecord, instant: DateTime<Utc>) -> Result<bool, FilterError> {
    let updated_at = parse_field(record, "updated_at", record.updated_at.as_deref())?.ok_or_else(
        || FilterError::MissingField {
            id: record.id.clone(),
            field: "updated_at",
        },
    )?;
    Ok(updated_at < instant)
}

/// Whether a record survives the window and parent checks
pub fn is_active(
    record: &EntityRecord,
    window: &TimeWindow,
    parent: Option<&ParentFilter<'_>>,
) -> Result<bool, FilterError> {
    if let Some(end) = parse_field(record, "end_time", record.end_time.as_deref())? {
        if end < window.start() {
            return Ok(false);
        }
    }

    if let Some(start) = parse_field(record, "start_time", record.start_time.as_deref())? {
        if start > window.end() {
            return Ok(false);
        }
    }

    if record.deleted && updated_before(record, window.start())? {
        return Ok(false);
    }

    if record.paused && updated_before(record, window.start())? {
        return Ok(false);
    }

    if let Some(parent) = parent {
        if !parent.admits(record) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Ids of the records active in `window`, in input order
///
/// # Errors
/// Any malformed timestamp aborts filtering
pub fn filter_entities(
    records: &[EntityRecord],
    window: &TimeWindow,
    parent: Option<ParentFilter<'_>>,
) -> Result<Vec<String>, FilterError> {
    let mut survivors = Vec::new();
    for record in records {
        if is_active(record, window, parent.as_ref())? {
            survivors.push(record.id.clone());
        }
    }
    Ok(survivors)
}
