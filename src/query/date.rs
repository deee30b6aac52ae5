//! Date inputs accepted by temporal selectors

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{OracleError, Result};

/// Anything a caller may pass as a point in time
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Millis(i64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl DateInput {
    /// Normalize to milliseconds since the Unix epoch.
    ///
    /// Plain dates (`2021-04-19`) and naive date-times are read as UTC.
    pub fn to_millis(&self) -> Result<i64> {
        match self {
            DateInput::Millis(ms) => Ok(*ms),
            DateInput::DateTime(dt) => Ok(dt.timestamp_millis()),
            DateInput::Text(text) => parse_text(text),
        }
    }
}

fn parse_text(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    let invalid = || OracleError::InvalidDate {
        input: text.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid());
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse::<i64>().map_err(|_| invalid());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&midnight).timestamp_millis());
    }
    Err(invalid())
}

impl From<i64> for DateInput {
    fn from(ms: i64) -> Self {
        DateInput::Millis(ms)
    }
}

impl From<&str> for DateInput {
    fn from(text: &str) -> Self {
        DateInput::Text(text.to_string())
    }
}

impl From<String> for DateInput {
    fn from(text: String) -> Self {
        DateInput::Text(text)
    }
}

impl From<DateTime<Utc>> for DateInput {
    fn from(dt: DateTime<Utc>) -> Self {
        DateInput::DateTime(dt)
    }
}

impl From<NaiveDate> for DateInput {
    fn from(date: NaiveDate) -> Self {
        DateInput::Text(date.format("%Y-%m-%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_date_is_utc_midnight() {
        let ms = DateInput::from("2021-04-19").to_millis().unwrap();
        assert_eq!(ms, 1_618_790_400_000);
    }

    #[test]
    fn test_rfc3339_with_offset() {
        let ms = DateInput::from("2021-04-20T23:59:00+00:00")
            .to_millis()
            .unwrap();
        assert_eq!(ms, 1_618_963_140_000);
    }

    #[test]
    fn test_numeric_string_and_millis() {
        assert_eq!(DateInput::from("1618790400000").to_millis().unwrap(), 1_618_790_400_000);
        assert_eq!(DateInput::from(42_i64).to_millis().unwrap(), 42);
    }

    #[test]
    fn test_naive_date_matches_text() {
        let date = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap();
        assert_eq!(
            DateInput::from(date).to_millis().unwrap(),
            DateInput::from("2021-04-17").to_millis().unwrap()
        );
    }

    #[test]
    fn test_garbage_is_invalid_date() {
        let err = DateInput::from("yesterday").to_millis().unwrap_err();
        assert_eq!(
            err,
            OracleError::InvalidDate {
                input: "yesterday".to_string()
            }
        );
    }
}
