//! Query parameter parsing shared by the query and streaming endpoints.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::ApiError;

/// Number of samples returned by the history endpoint when `limit` is absent.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Raw parameters of `GET /api/price/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Unix seconds; only samples strictly after it are returned.
    pub since: Option<String>,
    /// Maximum number of (newest) samples to return.
    pub limit: Option<String>,
}

/// Raw parameters of the streaming endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Unix seconds; retained samples strictly after it are replayed first.
    pub since: Option<String>,
}

/// Parse an optional Unix-seconds `since` value.
///
/// An absent or empty value means "no filter".
///
/// # Errors
///
/// Returns `ApiError::BadRequest` if the value is not an integer or is out
/// of the representable time range.
pub fn parse_since(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let secs: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid since: {raw}")))?;

    Utc.timestamp_opt(secs, 0)
        .single()
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("since out of range: {raw}")))
}

/// Parse an optional positive `limit`, defaulting to [`DEFAULT_HISTORY_LIMIT`].
///
/// # Errors
///
/// Returns `ApiError::BadRequest` if the value is not a positive integer.
pub fn parse_limit(raw: Option<&str>) -> Result<usize, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_HISTORY_LIMIT);
    };

    match raw.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(ApiError::BadRequest(format!(
            "invalid limit: {raw} (expected a positive integer)"
        ))),
    }
}
