//! Parquet output to object storage.
//!
//! Builds the OpenDAL operator for the configured target and writes one
//! Parquet object per run.

mod storage;
mod write;

pub use storage::{build_operator, display_root};
pub use write::{PartitionWriter, WrittenFile};
