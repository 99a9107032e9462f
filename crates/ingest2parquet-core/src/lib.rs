// ingest2parquet-core - Pure extraction-to-Parquet logic
//
// Everything here is free of I/O and async: the record model, execution
// date validation, reshaping, Arrow conversion, Parquet encoding and
// partition paths. Sources, storage and the CLI live in the root crate.

pub mod date;
pub mod error;
pub mod parquet;
pub mod partition;
pub mod record;
pub mod reshape;
pub mod to_arrow;

pub use date::{validate_date, ExecutionDate, PartitionDate};
pub use error::{ErrorCode, IngestError, Result};
pub use partition::{build_path, output_file_name};
pub use record::{Record, Timestamp, Value};
pub use reshape::{coerce_timestamp, parse_iso_timestamp, reshape_record, reshape_records, Coerced};
pub use to_arrow::records_to_batch;

use arrow::array::RecordBatch;

/// Reshape a batch of extracted records and encode it as Parquet bytes.
///
/// Returns the Arrow batch alongside the bytes so callers can report row
/// counts and schema without decoding the file again.
pub fn encode_records(
    records: &mut [Record],
    execution_date: &ExecutionDate,
) -> Result<(RecordBatch, Vec<u8>)> {
    reshape_records(records);
    let batch = records_to_batch(records)?;
    let bytes = crate::parquet::write_parquet(&batch, Some(execution_date))?;
    Ok((batch, bytes))
}
