//! Row-level conversions shared by the repositories.
//!
//! Timestamps are stored as fixed-width RFC 3339 text so that `ORDER BY
//! created_at` sorts chronologically.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid stored timestamp '{}'", s))?
        .with_timezone(&Utc))
}
