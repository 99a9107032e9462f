// Execution date handling
//
// The execution date scopes a run: it filters the source and names the
// partition. It is validated once, before any I/O.

use crate::error::{IngestError, Result};
use crate::record::Timestamp;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt;
use std::str::FromStr;

/// A validated `YYYY-MM-DD` calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionDate {
    raw: String,
    date: NaiveDate,
}

impl ExecutionDate {
    /// The date exactly as the caller supplied it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl fmt::Display for ExecutionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ExecutionDate {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        validate_date(s)
    }
}

impl From<NaiveDate> for ExecutionDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            raw: date.format("%Y-%m-%d").to_string(),
            date,
        }
    }
}

/// Validate an execution date string.
///
/// Accepts only zero-padded `YYYY-MM-DD` naming a real calendar day, so the
/// returned `as_str()` is always identical to the input.
pub fn validate_date(input: &str) -> Result<ExecutionDate> {
    let bytes = input.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if !shape_ok {
        return Err(IngestError::validation(input));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| IngestError::validation(input))?;

    Ok(ExecutionDate {
        raw: input.to_string(),
        date,
    })
}

/// Anything that can name a partition day.
///
/// Richer values (timestamps) are reduced to their calendar date.
pub trait PartitionDate {
    fn partition_date(&self) -> NaiveDate;
}

impl PartitionDate for ExecutionDate {
    fn partition_date(&self) -> NaiveDate {
        self.date
    }
}

impl PartitionDate for NaiveDate {
    fn partition_date(&self) -> NaiveDate {
        *self
    }
}

impl PartitionDate for NaiveDateTime {
    fn partition_date(&self) -> NaiveDate {
        self.date()
    }
}

impl<Tz: TimeZone> PartitionDate for DateTime<Tz> {
    fn partition_date(&self) -> NaiveDate {
        self.date_naive()
    }
}

impl PartitionDate for Timestamp {
    fn partition_date(&self) -> NaiveDate {
        self.date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn valid_dates_round_trip_unchanged() {
        for input in ["2024-12-01", "2024-02-29", "1999-01-31", "0001-01-01"] {
            let date = validate_date(input).unwrap();
            assert_eq!(date.as_str(), input);
            assert_eq!(date.to_string(), input);
        }
    }

    #[test]
    fn malformed_dates_are_rejected() {
        for input in [
            "",
            "2024-1-05",
            "2024/12/01",
            "2024-12-01T00:00:00",
            "2023-02-29",
            "2024-13-01",
            "2024-12-32",
            " 2024-12-01",
            "20241201",
            "+024-12-01",
            "abcd-ef-gh",
        ] {
            let err = validate_date(input).unwrap_err();
            assert_eq!(err.code(), ErrorCode::E002InvalidDate, "input {input:?}");
        }
    }

    #[test]
    fn from_naive_date_renders_padded() {
        let date: ExecutionDate = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().into();
        assert_eq!(date.as_str(), "2024-03-05");
    }

    #[test]
    fn timestamps_reduce_to_dates() {
        let ts = NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            ts.partition_date(),
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
        );
        assert_eq!(
            ts.and_utc().partition_date(),
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
        );
    }
}
