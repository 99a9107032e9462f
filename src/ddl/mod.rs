//! Warehouse DDL executor.
//!
//! Runs a folder of `.sql` files against a warehouse, one statement file at
//! a time, in path order. Shares nothing with the ingestion pipeline.

pub mod auth;
pub mod bigquery;

use async_trait::async_trait;
use ingest2parquet_core::{IngestError, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub use bigquery::BigQueryWarehouse;

/// Default folder holding DDL files
pub const DEFAULT_SQL_FOLDER: &str = "bigquery";

/// Default file-name pattern
pub const DEFAULT_PATTERN: &str = "*.sql";

/// What the warehouse reported for one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub job_id: Option<String>,
    /// Bytes scanned, or that would be scanned on a dry run
    pub bytes_processed: Option<u64>,
    pub affected_rows: Option<u64>,
}

/// A warehouse that can run one SQL script.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short name for logs, e.g. `bigquery:my-project`
    fn name(&self) -> String;

    /// Execute `sql`, or only validate it when `dry_run` is set.
    async fn execute(&self, sql: &str, dry_run: bool) -> Result<ExecutionReport>;
}

/// Options for one executor run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Succeeded(ExecutionReport),
    Failed(String),
    /// Nothing left after stripping comments
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Outcome of a run over a set of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DdlSummary {
    /// Files discovered, including any never attempted
    pub total: usize,
    pub results: Vec<FileResult>,
}

impl DdlSummary {
    pub fn successes(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Succeeded(_)))
    }

    pub fn failures(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped))
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Process exit code: 0 when nothing failed, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Find the files to run.
///
/// Explicit `files` are resolved under `folder` and must exist. Otherwise
/// every file in `folder` whose name matches `pattern`, sorted by path.
pub fn discover_sql_files(folder: &Path, pattern: &str, files: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(IngestError::not_found(
            "SQL folder",
            folder.display().to_string(),
        ));
    }

    if !files.is_empty() {
        return files
            .iter()
            .map(|name| {
                let path = folder.join(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(IngestError::not_found("SQL file", path.display().to_string()))
                }
            })
            .collect();
    }

    let matcher = glob::Pattern::new(pattern)
        .map_err(|e| IngestError::config(format!("Invalid file pattern '{}': {}", pattern, e)))?;

    let entries = std::fs::read_dir(folder).map_err(|e| {
        IngestError::not_found("SQL folder", format!("{} ({})", folder.display(), e))
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            IngestError::not_found("SQL folder entry", format!("{} ({})", folder.display(), e))
        })?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| matcher.matches(name));
        if matches && path.is_file() {
            found.push(path);
        }
    }

    if found.is_empty() {
        return Err(IngestError::not_found(
            format!("Files matching '{}'", pattern),
            folder.display().to_string(),
        ));
    }

    found.sort();
    Ok(found)
}

/// Drop every line whose trimmed form starts with `--`, then trim.
pub fn strip_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Read a SQL file; `None` when only comments or whitespace remain.
pub fn read_sql_file(path: &Path) -> Result<Option<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::not_found("SQL file", format!("{} ({})", path.display(), e))
    })?;
    let sql = strip_comments(&content);
    Ok((!sql.is_empty()).then_some(sql))
}

/// Execute `files` in order against `warehouse`.
///
/// Stops after the first failure unless `continue_on_error` is set. Read
/// errors count as failures.
pub async fn run_ddl<W>(warehouse: &W, files: &[PathBuf], options: &RunOptions) -> DdlSummary
where
    W: Warehouse + ?Sized,
{
    let total = files.len();
    let mode = if options.dry_run { "Dry-running" } else { "Executing" };
    info!("{} {} SQL file(s) against {}", mode, total, warehouse.name());

    let mut summary = DdlSummary {
        total,
        results: Vec::with_capacity(total),
    };

    for (idx, path) in files.iter().enumerate() {
        let name = path.display();
        info!("[{}/{}] {}", idx + 1, total, name);

        let status = match read_sql_file(path) {
            Ok(None) => {
                warn!("Skipping {}: no SQL after removing comments", name);
                FileStatus::Skipped
            }
            Ok(Some(sql)) => match warehouse.execute(&sql, options.dry_run).await {
                Ok(report) => {
                    log_success(path, &report, options.dry_run);
                    FileStatus::Succeeded(report)
                }
                Err(e) => {
                    error!("Failed {}: {}", name, e);
                    FileStatus::Failed(e.to_string())
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", name, e);
                FileStatus::Failed(e.to_string())
            }
        };

        let failed = matches!(status, FileStatus::Failed(_));
        summary.results.push(FileResult {
            path: path.clone(),
            status,
        });

        if failed && !options.continue_on_error {
            warn!(
                "Stopping after first failure; {} file(s) not attempted (use --continue-on-error to run all)",
                total - idx - 1
            );
            break;
        }
    }

    info!(
        "DDL summary: {} total, {} succeeded, {} failed, {} skipped",
        summary.total,
        summary.successes(),
        summary.failures(),
        summary.skipped()
    );
    summary
}

fn log_success(path: &Path, report: &ExecutionReport, dry_run: bool) {
    let job = report.job_id.as_deref().unwrap_or("-");
    if dry_run {
        info!(
            "Valid: {} (would process {} bytes)",
            path.display(),
            report.bytes_processed.unwrap_or(0)
        );
    } else if let Some(rows) = report.affected_rows {
        info!("Done: {} (job {}, {} rows affected)", path.display(), job, rows);
    } else {
        info!("Done: {} (job {})", path.display(), job);
    }
}
