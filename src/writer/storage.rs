//! Storage operator construction.

use crate::config::{StorageBackend, TargetConfig};
use ingest2parquet_core::{IngestError, Result};
use opendal::Operator;
use tracing::{debug, warn};

/// Build an OpenDAL operator for the configured target.
///
/// For object stores the operator is rooted at the bucket; for `fs` the
/// bucket names the root directory.
pub fn build_operator(target: &TargetConfig) -> Result<Operator> {
    let operator = match target.storage {
        StorageBackend::Gcs => {
            let mut builder = opendal::services::Gcs::default()
                .bucket(&target.bucket)
                .root("/");

            match target.credentials_path.as_deref() {
                Some(path) => {
                    debug!("Using GCS credentials from {}", path);
                    builder = builder.credential_path(path);
                }
                None => warn!(
                    "No credentials_path configured for GCS; falling back to application default credentials"
                ),
            }

            Operator::new(builder)
                .map_err(|e| {
                    IngestError::write_failure(format!("Failed to create GCS operator: {}", e))
                })?
                .finish()
        }
        StorageBackend::S3 => {
            let region = target.region.as_deref().ok_or_else(|| {
                IngestError::config("pipeline.target.region is required for S3 storage")
            })?;

            let mut builder = opendal::services::S3::default()
                .bucket(&target.bucket)
                .region(region)
                .root("/");

            if let Some(endpoint) = &target.endpoint {
                builder = builder.endpoint(endpoint);
            }

            Operator::new(builder)
                .map_err(|e| {
                    IngestError::write_failure(format!("Failed to create S3 operator: {}", e))
                })?
                .finish()
        }
        StorageBackend::Fs => {
            let builder = opendal::services::Fs::default().root(&target.bucket);
            Operator::new(builder)
                .map_err(|e| {
                    IngestError::write_failure(format!(
                        "Failed to create filesystem operator: {}",
                        e
                    ))
                })?
                .finish()
        }
    };

    debug!("Storage operator initialized for {} backend", target.storage);
    Ok(operator)
}

/// Human-readable location of the operator root, e.g. `gs://bucket`.
pub fn display_root(target: &TargetConfig) -> String {
    match target.storage {
        StorageBackend::Gcs => format!("gs://{}", target.bucket.trim_matches('/')),
        StorageBackend::S3 => format!("s3://{}", target.bucket.trim_matches('/')),
        StorageBackend::Fs => {
            let trimmed = target.bucket.trim_end_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}
