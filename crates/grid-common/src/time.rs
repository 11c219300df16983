//! Time-step metadata for multi-timestep datasets.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// User time and optional calendar stamp of one dataset timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStep {
    /// Model time in user units (seconds, hours, ...).
    pub user_time: f64,
    /// Calendar stamp, if the dataset carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
}

impl TimeStep {
    pub fn new(user_time: f64) -> Self {
        Self {
            user_time,
            time_stamp: None,
        }
    }

    pub fn with_stamp(user_time: f64, stamp: impl Into<String>) -> Self {
        Self {
            user_time,
            time_stamp: Some(stamp.into()),
        }
    }

    /// Parsed calendar time, if a stamp is present.
    pub fn datetime(&self) -> Result<Option<DateTime<Utc>>> {
        self.time_stamp.as_deref().map(parse_time_stamp).transpose()
    }
}

/// Parse a timestep stamp.
///
/// Accepts RFC 3339, `YYYY-mm-ddTHH:MM:SS` and `YYYY-mm-dd_HH:MM:SS`
/// (both assumed UTC) and a bare date.
pub fn parse_time_stamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d_%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Some(ndt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(GridError::format(format!("invalid time stamp: {}", s)))
}
