// ingest2parquet - Extract rows for an execution date into partitioned Parquet
//
// Sources (PostgreSQL, CSV) stream records, the core crate reshapes and
// encodes them, and the writer puts one Parquet object on GCS, S3 or a
// local directory. The `ddl` module runs warehouse DDL files separately.

pub mod config;
pub mod ddl;
mod init;
pub mod pipeline;
pub mod source;
pub mod writer;

pub use config::IngestConfig;
pub use init::init_tracing;
pub use pipeline::{ingest, run_ingestion, IngestOutcome};
pub use source::Source;
pub use writer::{PartitionWriter, WrittenFile};

pub use ingest2parquet_core::{validate_date, ExecutionDate, IngestError, Record, Value};
