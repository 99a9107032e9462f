//! Record sources.
//!
//! A source yields the records whose date column falls on one execution
//! date. Both implementations stream lazily; the driver collects them.

pub mod csv;
pub mod postgres;

use crate::config::{IngestConfig, SourceType};
use async_trait::async_trait;
use futures::stream::BoxStream;
use ingest2parquet_core::{ExecutionDate, IngestError, Record, Result};

pub use self::csv::CsvSource;
pub use self::postgres::PostgresSource;

/// Stream of records produced by one extraction
pub type RecordStream<'a> = BoxStream<'a, Result<Record>>;

/// A producer of records for an execution date.
///
/// `open` and `close` bracket a run. Implementations must also release
/// resources when dropped without `close`.
#[async_trait]
pub trait Source: Send {
    /// Short human-readable description for logs
    fn describe(&self) -> String;

    /// Acquire resources up front. Extraction acquires lazily if skipped.
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release resources acquired by `open` or `extract`.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stream records whose date column falls on `date`.
    ///
    /// The stream is finite and cannot be restarted.
    async fn extract<'a>(&'a mut self, date: &ExecutionDate) -> Result<RecordStream<'a>>;
}

/// Build the source selected by `pipeline.source_type`.
pub fn from_config(config: &IngestConfig) -> Result<Box<dyn Source>> {
    let source = &config.pipeline.source;

    match config.pipeline.source_type {
        SourceType::Postgres => {
            let db = config.database.clone().ok_or_else(|| {
                IngestError::config("postgres source requires a 'database' section")
            })?;
            let pg = PostgresSource::new(
                db,
                config.resolved_schema(),
                &source.table,
                &source.date_column,
                source.page_size,
            )?;
            Ok(Box::new(pg))
        }
        SourceType::Csv => {
            let path = source
                .file_path
                .as_deref()
                .ok_or_else(|| IngestError::config("csv source requires pipeline.source.file_path"))?;
            let csv = CsvSource::new(path, &source.date_column, &source.encoding)?;
            Ok(Box::new(csv))
        }
    }
}
