// Initialization utilities
//
// Storage writer and logging/tracing setup

use crate::config::{IngestConfig, LogFormat, LoggingConfig, StorageBackend};
use crate::writer::PartitionWriter;
use ingest2parquet_core::Result;
use tracing::info;

/// Initialize the partition writer from IngestConfig
pub(crate) fn init_writer(config: &IngestConfig) -> Result<PartitionWriter> {
    let target = &config.pipeline.target;
    info!(
        "Initializing writer with storage backend: {}",
        target.storage
    );

    match target.storage {
        StorageBackend::Gcs => info!("Using GCS storage: bucket={}", target.bucket),
        StorageBackend::S3 => info!(
            "Using S3 storage: bucket={}, region={}",
            target.bucket,
            target.region.as_deref().unwrap_or("-")
        ),
        StorageBackend::Fs => info!("Using filesystem storage at: {}", target.bucket),
    }

    if !target.is_partitioned() {
        info!("No partition_column configured; writing unpartitioned output");
    }

    PartitionWriter::from_config(target)
}

/// Initialize tracing/logging
pub fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match logging.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
