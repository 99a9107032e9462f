// Per-record reshaping applied between extraction and Arrow conversion
//
// 1. created_at / updated_at text values are coerced to timestamps when they
//    parse as ISO-8601. Failure keeps the original text.
// 2. A `dt` date column is derived from created_at, falling back to
//    updated_at.

use crate::date::validate_date;
use crate::record::{Record, Timestamp, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Fields eligible for timestamp coercion, in `dt` precedence order.
pub const TIMESTAMP_FIELDS: [&str; 2] = ["created_at", "updated_at"];

/// Name of the derived partition column.
pub const PARTITION_FIELD: &str = "dt";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// %#z accepts `Z`, `+HH`, `+HHMM` and `+HH:MM`
const ZONED_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];

/// Outcome of best-effort timestamp coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Parsed(Timestamp),
    Original(String),
}

impl From<Coerced> for Value {
    fn from(coerced: Coerced) -> Self {
        match coerced {
            Coerced::Parsed(ts) => Value::Timestamp(ts),
            Coerced::Original(text) => Value::Text(text),
        }
    }
}

/// Parse an ISO-8601 date or date-time.
///
/// Accepts `YYYY-MM-DD` (midnight), `YYYY-MM-DD[T ]HH:MM[:SS[.fraction]]`
/// and the same with a `Z` or numeric UTC offset.
pub fn parse_iso_timestamp(input: &str) -> Option<Timestamp> {
    if input.len() == 10 {
        return validate_date(input)
            .ok()
            .and_then(|date| date.date().and_hms_opt(0, 0, 0))
            .map(Timestamp::Naive);
    }

    for format in ZONED_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(input, format) {
            return Some(Timestamp::Zoned(ts));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(input, format) {
            return Some(Timestamp::Naive(ts));
        }
    }

    None
}

/// Total coercion: never fails, hands the text back when it does not parse.
pub fn coerce_timestamp(text: String) -> Coerced {
    match parse_iso_timestamp(&text) {
        Some(ts) => Coerced::Parsed(ts),
        None => Coerced::Original(text),
    }
}

/// Date for the partition column; created_at wins over updated_at.
pub fn derive_partition_date(record: &Record) -> Option<NaiveDate> {
    TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| record.get(field).and_then(Value::as_timestamp))
        .map(Timestamp::date)
}

/// Apply timestamp coercion and `dt` derivation to one record in place.
pub fn reshape_record(record: &mut Record) {
    for field in TIMESTAMP_FIELDS {
        if let Some(value) = record.get_mut(field) {
            if let Value::Text(text) = value {
                let text = std::mem::take(text);
                *value = coerce_timestamp(text).into();
            }
        }
    }

    if let Some(date) = derive_partition_date(record) {
        record.insert(PARTITION_FIELD, date);
    }
}

/// Reshape every record of a batch.
pub fn reshape_records(records: &mut [Record]) {
    records.iter_mut().for_each(reshape_record);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_iso_shapes() {
        let cases = [
            ("2024-12-01", false),
            ("2024-12-01 10:00:00", false),
            ("2024-12-01T10:00:00", false),
            ("2024-12-01T10:00", false),
            ("2024-12-01T10:00:00.123456", false),
            ("2024-12-01T10:00:00Z", true),
            ("2024-12-01T10:00:00+05:30", true),
            ("2024-12-01 10:00:00.5-0800", true),
        ];

        for (input, zoned) in cases {
            let ts = parse_iso_timestamp(input)
                .unwrap_or_else(|| panic!("expected {input:?} to parse"));
            assert_eq!(ts.is_zoned(), zoned, "input {input:?}");
            assert_eq!(ts.date(), date(2024, 12, 1), "input {input:?}");
        }
    }

    #[test]
    fn rejects_non_timestamps() {
        for input in ["", "yesterday", "2024-13-01 10:00:00", "12/01/2024", "2024-12-01 25:00"] {
            assert!(parse_iso_timestamp(input).is_none(), "input {input:?}");
        }
    }

    #[test]
    fn coercion_hands_back_unparseable_text() {
        assert_eq!(
            coerce_timestamp("not a date".to_string()),
            Coerced::Original("not a date".to_string())
        );
        assert!(matches!(
            coerce_timestamp("2024-12-01 10:00:00".to_string()),
            Coerced::Parsed(Timestamp::Naive(_))
        ));
    }

    #[test]
    fn created_at_wins_over_updated_at() {
        let mut record: Record = [
            ("id", Value::Int(1)),
            ("created_at", "2024-12-01 10:00:00".into()),
            ("updated_at", "2024-12-03 08:00:00".into()),
        ]
        .into_iter()
        .collect();

        reshape_record(&mut record);

        assert!(matches!(record.get("created_at"), Some(Value::Timestamp(_))));
        assert!(matches!(record.get("updated_at"), Some(Value::Timestamp(_))));
        assert_eq!(record.get("dt"), Some(&Value::Date(date(2024, 12, 1))));
    }

    #[test]
    fn falls_back_to_updated_at() {
        let mut record: Record = [
            ("created_at", Value::from("garbage")),
            ("updated_at", "2024-12-03T08:00:00".into()),
        ]
        .into_iter()
        .collect();

        reshape_record(&mut record);

        assert_eq!(record.get("created_at"), Some(&Value::from("garbage")));
        assert_eq!(record.get("dt"), Some(&Value::Date(date(2024, 12, 3))));
    }

    #[test]
    fn no_timestamp_means_no_dt() {
        let mut record: Record = [("name", Value::from("alice")), ("created_at", Value::Null)]
            .into_iter()
            .collect();

        reshape_record(&mut record);

        assert!(!record.contains("dt"));
        assert_eq!(record.get("created_at"), Some(&Value::Null));
    }

    #[test]
    fn typed_timestamps_are_left_alone_but_drive_dt() {
        let ts = date(2024, 11, 30).and_hms_opt(12, 0, 0).unwrap();
        let mut record: Record = [("updated_at", Value::Timestamp(Timestamp::Naive(ts)))]
            .into_iter()
            .collect();

        reshape_record(&mut record);

        assert_eq!(
            record.get("updated_at"),
            Some(&Value::Timestamp(Timestamp::Naive(ts)))
        );
        assert_eq!(record.get("dt"), Some(&Value::Date(date(2024, 11, 30))));
    }
}
