//! Timestamp helpers for stage and execution times.
//!
//! Times travel over the wire as epoch milliseconds, matching what the
//! persistence and UI collaborators expect.

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The input type is not supported.
    #[error("Unsupported timestamp type: expected string or number")]
    UnsupportedType,

    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

/// Converts epoch milliseconds into a timestamp.
#[must_use]
pub fn from_epoch_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_epoch_millis(value: i64) -> Result<Timestamp, TimestampError> {
    from_epoch_millis(value).ok_or_else(|| TimestampError::InvalidFormat(value.to_string()))
}

/// Parses a timestamp string: epoch milliseconds or an RFC 3339 date-time.
///
/// # Errors
///
/// Returns `TimestampError` if the input cannot be parsed.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(num) = trimmed.parse::<i64>() {
        return parse_epoch_millis(num);
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimestampError::InvalidFormat(trimmed.to_string()))
}

/// Parses a loosely-typed JSON value (string or integer) into a timestamp.
///
/// Integers are always epoch milliseconds, matching the serialized form of
/// stage and execution times.
///
/// # Errors
///
/// Returns `TimestampError::UnsupportedType` for anything but strings and integers.
pub fn timestamp_from_value(value: &serde_json::Value) -> Result<Timestamp, TimestampError> {
    match value {
        serde_json::Value::String(s) => parse_timestamp(s),
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| TimestampError::InvalidFormat(n.to_string()))
            .and_then(parse_epoch_millis),
        _ => Err(TimestampError::UnsupportedType),
    }
}
