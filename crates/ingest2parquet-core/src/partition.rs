//! Partition path generation
//!
//! Generates Hive-style partition paths:
//! `{root}/{path}/dt={YYYY-MM-DD}` and `{YYYYMMDD_HHMMSS}.parquet` file names.

use crate::date::PartitionDate;
use chrono::NaiveDateTime;

/// Hive partition key written into the path.
pub const PARTITION_KEY: &str = "dt";

/// Build the destination location for one execution date.
///
/// Empty segments are skipped, so an empty `root` yields a key relative to
/// the storage root. Without partitioning the `dt=` segment is omitted.
pub fn build_path<D>(root: &str, path: &str, date: &D, partitioned: bool) -> String
where
    D: PartitionDate + ?Sized,
{
    let mut segments: Vec<String> = Vec::with_capacity(3);

    let root = root.trim_end_matches('/');
    if !root.is_empty() {
        segments.push(root.to_string());
    }

    let path = path.trim_matches('/');
    if !path.is_empty() {
        segments.push(path.to_string());
    }

    if partitioned {
        segments.push(partition_segment(date));
    }

    segments.join("/")
}

/// `dt=YYYY-MM-DD`
pub fn partition_segment<D>(date: &D) -> String
where
    D: PartitionDate + ?Sized,
{
    format!(
        "{}={}",
        PARTITION_KEY,
        date.partition_date().format("%Y-%m-%d")
    )
}

/// Write-time file name, unique per second: `YYYYMMDD_HHMMSS.parquet`.
pub fn output_file_name(written_at: &NaiveDateTime) -> String {
    format!("{}.parquet", written_at.format("%Y%m%d_%H%M%S"))
}
