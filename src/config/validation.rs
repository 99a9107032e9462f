// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use crate::source::csv::Encoding;
use ingest2parquet_core::{IngestError, Result};
use tracing::warn;

pub fn validate_config(config: &IngestConfig) -> Result<()> {
    match config.pipeline.source_type {
        SourceType::Postgres => validate_postgres_source(config)?,
        SourceType::Csv => validate_csv_source(&config.pipeline.source)?,
    }

    validate_target_config(&config.pipeline.target)?;
    validate_logging_config(&config.logging)?;

    Ok(())
}

fn bail(message: impl Into<String>) -> Result<()> {
    Err(IngestError::config(message))
}

fn validate_postgres_source(config: &IngestConfig) -> Result<()> {
    let source = &config.pipeline.source;

    if source.table.trim().is_empty() {
        return bail("pipeline.source.table is required for the postgres source");
    }

    if source.date_column.trim().is_empty() {
        return bail("pipeline.source.date_column is required");
    }

    if source.page_size == 0 {
        return bail("pipeline.source.page_size must be greater than 0");
    }

    if source.page_size > 1_000_000 {
        warn!(
            page_size = source.page_size,
            "pipeline.source.page_size is very large; may cause memory issues"
        );
    }

    let Some(db) = config.database.as_ref() else {
        return bail(
            "postgres source requires a 'database' section.\n\
            Either:\n\
            1. Add database.host, database.database and database.user to the config file\n\
            2. Or set INGEST2PARQUET_DB_HOST, INGEST2PARQUET_DB_NAME and INGEST2PARQUET_DB_USER",
        );
    };

    if db.host.is_empty() {
        return bail("database.host must not be empty");
    }

    if db.database.is_empty() {
        return bail("database.database is required (or set INGEST2PARQUET_DB_NAME)");
    }

    if db.user.is_empty() {
        return bail("database.user is required (or set INGEST2PARQUET_DB_USER)");
    }

    Ok(())
}

fn validate_csv_source(source: &SourceConfig) -> Result<()> {
    if source.file_path.as_deref().is_none_or(|p| p.trim().is_empty()) {
        return bail("pipeline.source.file_path is required for the csv source");
    }

    if source.date_column.trim().is_empty() {
        return bail("pipeline.source.date_column is required");
    }

    Encoding::from_name(&source.encoding)?;

    Ok(())
}

fn validate_target_config(target: &TargetConfig) -> Result<()> {
    if !target.file_format.eq_ignore_ascii_case("parquet") {
        return bail(format!(
            "Unsupported file format: {}. Only 'parquet' is supported",
            target.file_format
        ));
    }

    if target.bucket.trim().is_empty() {
        let field = match target.storage {
            StorageBackend::Fs => "pipeline.target.bucket (output directory)",
            _ => "pipeline.target.bucket",
        };
        return bail(format!(
            "{} is required for {} storage (or set INGEST2PARQUET_TARGET_BUCKET)",
            field, target.storage
        ));
    }

    match target.storage {
        StorageBackend::S3 => {
            if target.region.as_deref().is_none_or(str::is_empty) {
                return bail("pipeline.target.region is required for S3 storage");
            }
        }
        StorageBackend::Gcs => {
            if let Some(path) = target.credentials_path.as_deref() {
                if !Path::new(path).exists() {
                    return Err(IngestError::not_found("Credentials file", path));
                }
            }
        }
        StorageBackend::Fs => {}
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> Result<()> {
    if logging.level.trim().is_empty() {
        return bail("logging.level must not be empty");
    }

    Ok(())
}
