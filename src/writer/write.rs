//! Core write operation for Parquet output.
//!
//! Writes one Arrow RecordBatch as one Parquet object under a Hive-style
//! date partition using OpenDAL.

use crate::config::TargetConfig;
use arrow::array::RecordBatch;
use chrono::NaiveDateTime;
use ingest2parquet_core::parquet::write_parquet;
use ingest2parquet_core::{build_path, output_file_name, ExecutionDate, IngestError, Result};
use opendal::Operator;

use super::storage;

/// A Parquet object that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Object key relative to the operator root
    pub key: String,
    /// Full location for logs, e.g. `gs://bucket/users/dt=2024-12-01/...`
    pub location: String,
    pub rows: usize,
    pub bytes: usize,
}

/// Writes batches below `<root>/<path>[/dt=<date>]`.
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    operator: Operator,
    display_root: String,
    base_path: String,
    partitioned: bool,
}

impl PartitionWriter {
    pub fn new(
        operator: Operator,
        display_root: impl Into<String>,
        base_path: impl Into<String>,
        partitioned: bool,
    ) -> Self {
        Self {
            operator,
            display_root: display_root.into(),
            base_path: base_path.into(),
            partitioned,
        }
    }

    /// Build the operator and writer for `pipeline.target`.
    pub fn from_config(target: &TargetConfig) -> Result<Self> {
        let operator = storage::build_operator(target)?;
        Ok(Self::new(
            operator,
            storage::display_root(target),
            target.path.clone(),
            target.is_partitioned(),
        ))
    }

    /// Directory (relative to the root) that files for `date` land in.
    pub fn partition_dir(&self, date: &ExecutionDate) -> String {
        build_path("", &self.base_path, date, self.partitioned)
    }

    /// Full location of the partition directory, for logs.
    pub fn partition_location(&self, date: &ExecutionDate) -> String {
        build_path(&self.display_root, &self.base_path, date, self.partitioned)
    }

    /// Object key for a file written at `written_at`.
    pub fn object_key(&self, date: &ExecutionDate, written_at: &NaiveDateTime) -> String {
        let dir = self.partition_dir(date);
        let file = output_file_name(written_at);
        if dir.is_empty() {
            file
        } else {
            format!("{}/{}", dir, file)
        }
    }

    /// Encode `batch` as Parquet and write it as a single object.
    pub async fn write(
        &self,
        batch: &RecordBatch,
        date: &ExecutionDate,
        written_at: &NaiveDateTime,
    ) -> Result<WrittenFile> {
        let key = self.object_key(date, written_at);
        let location = format!("{}/{}", self.display_root.trim_end_matches('/'), key);

        tracing::debug!("Writing Parquet to path: {}", location);

        let parquet_bytes = write_parquet(batch, Some(date))?;
        let bytes_written = parquet_bytes.len();

        self.operator.write(&key, parquet_bytes).await.map_err(|e| {
            IngestError::write_failure(format!(
                "Failed to write parquet bytes to '{}': {}",
                location, e
            ))
        })?;

        let row_count = batch.num_rows();
        tracing::info!(
            "Wrote {} rows to '{}' ({} bytes)",
            row_count,
            location,
            bytes_written
        );

        Ok(WrittenFile {
            key,
            location,
            rows: row_count,
            bytes: bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn memory_writer(partitioned: bool) -> PartitionWriter {
        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        PartitionWriter::new(operator, "gs://lake", "users", partitioned)
    }

    fn written_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap()
    }

    #[test]
    fn keys_follow_hive_layout() {
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();

        let writer = memory_writer(true);
        assert_eq!(
            writer.object_key(&date, &written_at()),
            "users/dt=2024-12-01/20241201_143005.parquet"
        );
        assert_eq!(
            writer.partition_location(&date),
            "gs://lake/users/dt=2024-12-01"
        );

        let writer = memory_writer(false);
        assert_eq!(
            writer.object_key(&date, &written_at()),
            "users/20241201_143005.parquet"
        );
    }

    #[tokio::test]
    async fn writes_single_object() {
        let writer = memory_writer(true);
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)])),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();

        let written = writer.write(&batch, &date, &written_at()).await.unwrap();

        assert_eq!(written.rows, 3);
        assert_eq!(
            written.location,
            "gs://lake/users/dt=2024-12-01/20241201_143005.parquet"
        );
        let stored = writer.operator.read(&written.key).await.unwrap();
        assert_eq!(stored.len(), written.bytes);
        assert_eq!(&stored.to_vec()[0..4], b"PAR1");
    }
}
