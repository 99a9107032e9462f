//! Pipeline driver: extract, reshape, write.

use crate::config::IngestConfig;
use crate::source::{self, Source};
use crate::writer::{PartitionWriter, WrittenFile};
use chrono::{Local, NaiveDateTime};
use futures::TryStreamExt;
use ingest2parquet_core::{records_to_batch, reshape_records, ExecutionDate, Record, Result};
use tracing::{info, warn};

/// Result of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The source had no rows for the date; nothing was written
    Empty,
    /// One Parquet object was written
    Written(WrittenFile),
}

/// Run the ingestion described by `config` for one execution date.
pub async fn run_ingestion(config: &IngestConfig, date: &ExecutionDate) -> Result<IngestOutcome> {
    info!(
        "Starting ingestion for {} (source: {})",
        date, config.pipeline.source_type
    );

    let writer = crate::init::init_writer(config)?;
    let mut source = source::from_config(config)?;

    ingest(source.as_mut(), &writer, date, || Local::now().naive_local()).await
}

/// Extract everything for `date` from `source` and write it through `writer`.
///
/// The source is opened before extraction and closed afterwards. A close
/// failure only surfaces when the run otherwise succeeded. `clock` names the
/// output file and is read just before the write.
pub async fn ingest<C>(
    source: &mut dyn Source,
    writer: &PartitionWriter,
    date: &ExecutionDate,
    clock: C,
) -> Result<IngestOutcome>
where
    C: Fn() -> NaiveDateTime,
{
    let description = source.describe();
    info!("Source: {}", description);
    info!("Target: {}", writer.partition_location(date));

    source.open().await?;
    let outcome = extract_and_write(source, writer, date, clock).await;

    match (outcome, source.close().await) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!("Failed to close {}: {}", description, close_err);
            Err(err)
        }
    }
}

async fn extract_and_write<C>(
    source: &mut dyn Source,
    writer: &PartitionWriter,
    date: &ExecutionDate,
    clock: C,
) -> Result<IngestOutcome>
where
    C: Fn() -> NaiveDateTime,
{
    let mut records: Vec<Record> = source.extract(date).await?.try_collect().await?;
    info!("Extracted {} records for {}", records.len(), date);

    if records.is_empty() {
        info!("No records found for {}; nothing to write", date);
        return Ok(IngestOutcome::Empty);
    }

    reshape_records(&mut records);
    let batch = records_to_batch(&records)?;
    drop(records);

    let written_at = clock();
    let written = writer.write(&batch, date, &written_at).await?;
    info!(
        "Ingestion complete: {} rows written to {}",
        written.rows, written.location
    );
    Ok(IngestOutcome::Written(written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordStream;
    use async_trait::async_trait;
    use ingest2parquet_core::{IngestError, Value};
    use opendal::Operator;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted source that records its lifecycle calls.
    struct FakeSource {
        records: Vec<Record>,
        fail_extract: bool,
        fail_close: bool,
        opened: bool,
        closed: bool,
        extracted: Arc<AtomicBool>,
    }

    impl FakeSource {
        fn new(records: Vec<Record>) -> Self {
            Self {
                records,
                fail_extract: false,
                fail_close: false,
                opened: false,
                closed: false,
                extracted: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Source for FakeSource {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        async fn open(&mut self) -> Result<()> {
            self.opened = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            if self.fail_close {
                Err(IngestError::connection("fake", "close failed"))
            } else {
                Ok(())
            }
        }

        async fn extract<'a>(&'a mut self, _date: &ExecutionDate) -> Result<RecordStream<'a>> {
            if self.fail_extract {
                return Err(IngestError::query("relation \"missing\" does not exist"));
            }
            self.extracted.store(true, Ordering::SeqCst);
            let records = std::mem::take(&mut self.records);
            Ok(Box::pin(futures::stream::iter(
                records.into_iter().map(Ok::<Record, IngestError>),
            )))
        }
    }

    fn memory_writer() -> (Operator, PartitionWriter) {
        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let writer = PartitionWriter::new(operator.clone(), "memory://", "users", true);
        (operator, writer)
    }

    fn written_at() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn empty_extraction_writes_nothing() {
        let (operator, writer) = memory_writer();
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        let mut source = FakeSource::new(Vec::new());

        let outcome = ingest(&mut source, &writer, &date, written_at)
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Empty);
        assert!(source.opened && source.closed);
        let entries = operator.list_with("/").recursive(true).await.unwrap();
        assert!(entries.iter().all(|entry| !entry.path().ends_with(".parquet")));
    }

    #[tokio::test]
    async fn writes_one_file_under_partition() {
        let (_, writer) = memory_writer();
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        let record: Record = [
            ("id", Value::Int(1)),
            ("created_at", Value::from("2024-12-01 10:00:00")),
        ]
        .into_iter()
        .collect();
        let mut source = FakeSource::new(vec![record]);

        let outcome = ingest(&mut source, &writer, &date, written_at)
            .await
            .unwrap();

        match outcome {
            IngestOutcome::Written(file) => {
                assert_eq!(file.key, "users/dt=2024-12-01/20241201_120000.parquet");
                assert_eq!(file.rows, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn extract_error_wins_over_close_error() {
        let (_, writer) = memory_writer();
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        let mut source = FakeSource::new(Vec::new());
        source.fail_extract = true;
        source.fail_close = true;

        let err = ingest(&mut source, &writer, &date, written_at)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Query { .. }));
        assert!(source.closed);
    }

    #[tokio::test]
    async fn close_error_fails_otherwise_successful_run() {
        let (_, writer) = memory_writer();
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        let mut source = FakeSource::new(Vec::new());
        source.fail_close = true;

        let err = ingest(&mut source, &writer, &date, written_at)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Connection { .. }));
    }

    #[tokio::test]
    async fn file_name_uses_time_of_write() {
        let (_, writer) = memory_writer();
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        let record: Record = [("id", Value::Int(1))].into_iter().collect();
        let mut source = FakeSource::new(vec![record]);

        let reads = Arc::new(AtomicUsize::new(0));
        let clock = {
            let extracted = Arc::clone(&source.extracted);
            let reads = Arc::clone(&reads);
            move || {
                assert!(extracted.load(Ordering::SeqCst), "clock read before extraction");
                reads.fetch_add(1, Ordering::SeqCst);
                written_at()
            }
        };

        ingest(&mut source, &writer, &date, clock).await.unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        // Empty runs never read the clock
        let mut empty = FakeSource::new(Vec::new());
        let reads_before = reads.load(Ordering::SeqCst);
        let outcome = ingest(&mut empty, &writer, &date, || {
            reads.fetch_add(1, Ordering::SeqCst);
            written_at()
        })
        .await
        .unwrap();
        assert_eq!(outcome, IngestOutcome::Empty);
        assert_eq!(reads.load(Ordering::SeqCst), reads_before);
    }
}
