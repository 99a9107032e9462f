// Record -> Arrow RecordBatch conversion
//
// Column order is first appearance across the batch. Each column's Arrow
// type is inferred from its non-null values; mixed kinds fall back to Utf8.

use crate::error::{IngestError, Result};
use crate::record::{Record, Value};
use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, RecordBatch,
    RecordBatchOptions, StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use chrono::NaiveDate;
use indexmap::IndexSet;
use std::sync::Arc;

/// Timezone attached to timestamp columns holding offset-aware values.
pub const UTC_TIMEZONE: &str = "UTC";

/// Inferred storage kind for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// No non-null value seen yet
    Null,
    Bool,
    Int,
    Float,
    Timestamp { zoned: bool },
    Date,
    Text,
}

impl ColumnKind {
    /// Widen this kind so it can also hold `value`.
    pub fn merge(self, value: &Value) -> ColumnKind {
        use ColumnKind as K;

        match (self, value) {
            (kind, Value::Null) => kind,
            (K::Text, _) => K::Text,
            (K::Null | K::Bool, Value::Bool(_)) => K::Bool,
            (K::Null | K::Int, Value::Int(_)) => K::Int,
            (K::Float, Value::Int(_)) => K::Float,
            (K::Null | K::Int | K::Float, Value::Float(_)) => K::Float,
            (K::Null, Value::Timestamp(ts)) => K::Timestamp {
                zoned: ts.is_zoned(),
            },
            (K::Timestamp { zoned }, Value::Timestamp(ts)) => K::Timestamp {
                zoned: zoned || ts.is_zoned(),
            },
            (K::Null | K::Date, Value::Date(_)) => K::Date,
            _ => K::Text,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Timestamp { zoned } => DataType::Timestamp(
                TimeUnit::Microsecond,
                zoned.then(|| Arc::from(UTC_TIMEZONE)),
            ),
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Null | ColumnKind::Text => DataType::Utf8,
        }
    }
}

/// Infer the ordered column list and kinds for a batch of records.
pub fn infer_columns(records: &[Record]) -> Vec<(String, ColumnKind)> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for record in records {
        names.extend(record.columns());
    }

    names
        .into_iter()
        .map(|name| {
            let kind = records
                .iter()
                .filter_map(|record| record.get(name))
                .fold(ColumnKind::Null, ColumnKind::merge);
            (name.to_string(), kind)
        })
        .collect()
}

/// Convert records into a single Arrow `RecordBatch`.
pub fn records_to_batch(records: &[Record]) -> Result<RecordBatch> {
    let columns = infer_columns(records);

    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, kind)| Field::new(name.as_str(), kind.data_type(), true))
        .collect();

    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(name, kind)| build_column(records, name, *kind))
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options).map_err(
        |e| IngestError::write_failure(format!("Failed to assemble Arrow batch: {}", e)),
    )
}

fn build_column(records: &[Record], name: &str, kind: ColumnKind) -> ArrayRef {
    let values = records
        .iter()
        .map(|record| record.get(name).unwrap_or(&Value::Null));

    match kind {
        ColumnKind::Bool => {
            let mut builder = BooleanBuilder::with_capacity(records.len());
            for value in values {
                match value {
                    Value::Bool(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Int => {
            let mut builder = Int64Builder::with_capacity(records.len());
            for value in values {
                match value {
                    Value::Int(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Float => {
            let mut builder = Float64Builder::with_capacity(records.len());
            for value in values {
                match value {
                    Value::Float(v) => builder.append_value(*v),
                    Value::Int(v) => builder.append_value(*v as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Timestamp { zoned } => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(records.len())
                .with_timezone_opt(zoned.then_some(UTC_TIMEZONE));
            for value in values {
                match value {
                    Value::Timestamp(ts) => builder.append_value(ts.timestamp_micros()),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Date => {
            let mut builder = Date32Builder::with_capacity(records.len());
            for value in values {
                match value {
                    Value::Date(d) => builder.append_value(days_since_epoch(*d)),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Null | ColumnKind::Text => {
            let mut builder = StringBuilder::with_capacity(records.len(), records.len() * 16);
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Text(text) => builder.append_value(text),
                    other => builder.append_value(other.to_string()),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    date.signed_duration_since(epoch).num_days() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Timestamp;
    use arrow::array::{Array, Date32Array, Float64Array, StringArray, TimestampMicrosecondArray};
    use chrono::DateTime;

    fn naive(s: &str) -> Value {
        Value::Timestamp(Timestamp::Naive(
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap(),
        ))
    }

    #[test]
    fn kinds_widen_as_expected() {
        let k = ColumnKind::Null.merge(&Value::Int(1));
        assert_eq!(k, ColumnKind::Int);
        assert_eq!(k.merge(&Value::Float(1.5)), ColumnKind::Float);
        assert_eq!(k.merge(&Value::Null), ColumnKind::Int);
        assert_eq!(k.merge(&Value::from("x")), ColumnKind::Text);
        assert_eq!(
            ColumnKind::Null.merge(&Value::Bool(true)).merge(&Value::Int(1)),
            ColumnKind::Text
        );
    }

    #[test]
    fn columns_follow_first_appearance() {
        let records = vec![
            [("id", Value::Int(1)), ("name", "a".into())]
                .into_iter()
                .collect::<Record>(),
            [("id", Value::Int(2)), ("email", "b@x".into())]
                .into_iter()
                .collect::<Record>(),
        ];

        let batch = records_to_batch(&records).unwrap();
        let names: Vec<_> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["id", "name", "email"]);

        let email = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(email.is_null(0));
        assert_eq!(email.value(1), "b@x");
    }

    #[test]
    fn ints_and_floats_share_a_float_column() {
        let records: Vec<Record> = vec![
            [("amount", Value::Int(2))].into_iter().collect(),
            [("amount", Value::Float(2.5))].into_iter().collect(),
        ];
        let batch = records_to_batch(&records).unwrap();
        let amount = batch
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(amount.value(0), 2.0);
        assert_eq!(amount.value(1), 2.5);
    }

    #[test]
    fn naive_timestamps_have_no_timezone() {
        let records: Vec<Record> = vec![[("created_at", naive("2024-12-01 10:00:00.123456789"))]
            .into_iter()
            .collect()];
        let batch = records_to_batch(&records).unwrap();

        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(col.value(0), 1_733_047_200_123_456);
    }

    #[test]
    fn any_zoned_value_makes_a_utc_column() {
        let zoned = Value::Timestamp(Timestamp::Zoned(
            DateTime::parse_from_rfc3339("2024-12-01T10:00:00+02:00").unwrap(),
        ));
        let records: Vec<Record> = vec![
            [("created_at", naive("2024-12-01 08:00:00"))].into_iter().collect(),
            [("created_at", zoned)].into_iter().collect(),
        ];
        let batch = records_to_batch(&records).unwrap();

        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from(UTC_TIMEZONE)))
        );
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(col.value(0), col.value(1));
    }

    #[test]
    fn mixed_kinds_render_as_text() {
        let records: Vec<Record> = vec![
            [("created_at", naive("2024-12-01 10:00:00"))].into_iter().collect(),
            [("created_at", Value::from("not a date"))].into_iter().collect(),
        ];
        let batch = records_to_batch(&records).unwrap();
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(col.value(0), "2024-12-01 10:00:00");
        assert_eq!(col.value(1), "not a date");
    }

    #[test]
    fn dates_become_date32() {
        let d = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let records: Vec<Record> = vec![[("dt", Value::Date(d))].into_iter().collect()];
        let batch = records_to_batch(&records).unwrap();
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(col.value(0), 20058);
    }

    #[test]
    fn all_null_columns_are_utf8() {
        let records: Vec<Record> = vec![[("note", Value::Null)].into_iter().collect()];
        let batch = records_to_batch(&records).unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column(0).is_null(0));
    }
}
