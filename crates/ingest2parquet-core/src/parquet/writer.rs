// Parquet writer with warehouse-friendly configuration
//
// Uses Snappy compression and dictionary encoding. Timestamp columns arrive
// from the Arrow conversion already at microsecond resolution.

use crate::date::ExecutionDate;
use crate::error::{IngestError, Result};
use arrow::array::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterPropertiesBuilder};
use parquet::format::KeyValue;
use std::io::Write;

fn compression_setting() -> Compression {
    Compression::SNAPPY
}

fn base_properties() -> WriterPropertiesBuilder {
    WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_compression(compression_setting())
        .set_data_page_size_limit(256 * 1024)
        .set_write_batch_size(32 * 1024)
        .set_max_row_group_size(128 * 1024)
        .set_dictionary_page_size_limit(128 * 1024)
}

/// Writer properties for one output file.
///
/// The crate version and, when known, the execution date are embedded as
/// key/value metadata.
pub fn writer_properties(execution_date: Option<&ExecutionDate>) -> WriterProperties {
    let mut metadata = vec![KeyValue {
        key: "ingest2parquet.version".to_string(),
        value: Some(env!("CARGO_PKG_VERSION").to_string()),
    }];

    if let Some(date) = execution_date {
        metadata.push(KeyValue {
            key: "ingest2parquet.execution_date".to_string(),
            value: Some(date.as_str().to_string()),
        });
    }

    base_properties()
        .set_key_value_metadata(Some(metadata))
        .build()
}

/// Write Arrow `RecordBatch` into an arbitrary `Write` sink.
pub fn write_parquet_into<W>(
    batch: &RecordBatch,
    writer: &mut W,
    execution_date: Option<&ExecutionDate>,
) -> Result<()>
where
    W: Write + Send,
{
    let props = writer_properties(execution_date);
    let mut arrow_writer = ArrowWriter::try_new(writer, batch.schema(), Some(props))
        .map_err(|e| IngestError::write_failure(format!("Failed to create Parquet writer: {}", e)))?;

    arrow_writer
        .write(batch)
        .map_err(|e| IngestError::write_failure(format!("Failed to encode Parquet rows: {}", e)))?;
    arrow_writer
        .close()
        .map_err(|e| IngestError::write_failure(format!("Failed to finish Parquet file: {}", e)))?;

    Ok(())
}

/// Write Arrow RecordBatch to Parquet format (in-memory buffer)
pub fn write_parquet(batch: &RecordBatch, execution_date: Option<&ExecutionDate>) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_parquet_into(batch, &mut buffer, execution_date)?;
    Ok(buffer)
}
