// Pipeline configuration
//
// Layered from lowest to highest priority:
// 1. Serde defaults
// 2. Config file (YAML or TOML, chosen by extension)
// 3. Environment variables (INGEST2PARQUET_* prefix, plus PGPASSWORD)
// 4. CLI flags (applied by the binary)

use ingest2parquet_core::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use sources::{load_from_file_path, load_with_env, StdEnvSource};

/// Default location of the pipeline config, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline_config.yaml";

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What to extract and where to write it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub source_type: SourceType,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub target: TargetConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Postgres,
    Csv,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Postgres => write!(f, "postgres"),
            SourceType::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SourceType::Postgres),
            "csv" => Ok(SourceType::Csv),
            _ => Err(IngestError::config(format!(
                "Unsupported source type: {}. Supported: postgres, csv",
                s
            ))),
        }
    }
}

/// Source settings; which fields matter depends on `source_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Table to extract from (postgres)
    #[serde(default)]
    pub table: String,

    /// Schema override (postgres); falls back to `database.schema`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Column whose date part must equal the execution date
    #[serde(default)]
    pub date_column: String,

    /// Rows fetched per cursor round-trip (postgres)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Input file (csv)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Text encoding of the input file (csv)
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_page_size() -> usize {
    1000
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table: String::new(),
            schema: None,
            date_column: String::new(),
            page_size: default_page_size(),
            file_path: None,
            encoding: default_encoding(),
        }
    }
}

/// Destination for the Parquet output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Bucket name (gcs, s3) or root directory (fs)
    #[serde(default)]
    pub bucket: String,

    /// Path below the bucket, usually the table name
    #[serde(default)]
    pub path: String,

    /// Hive partition key; output is unpartitioned when absent or empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_column: Option<String>,

    #[serde(default = "default_file_format")]
    pub file_format: String,

    /// Service account or authorized-user JSON for GCS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_file_format() -> String {
    "parquet".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            bucket: String::new(),
            path: String::new(),
            partition_column: None,
            file_format: default_file_format(),
            credentials_path: None,
            region: None,
            endpoint: None,
        }
    }
}

impl TargetConfig {
    /// Whether output goes under a `dt=YYYY-MM-DD` segment
    pub fn is_partitioned(&self) -> bool {
        self.partition_column
            .as_deref()
            .is_some_and(|column| !column.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Gcs,
    S3,
    Fs,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Gcs => write!(f, "gcs"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Fs => write!(f, "fs"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gcs" | "gs" => Ok(StorageBackend::Gcs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            _ => Err(IngestError::config(format!(
                "Unsupported storage backend: {}. Supported: gcs, s3, fs",
                s
            ))),
        }
    }
}

/// PostgreSQL connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: None,
        }
    }
}

// Keep the password out of logs and error output.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ingest2parquet=debug,sqlx=warn`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl IngestConfig {
    /// Load from a file, then apply process environment overrides and validate.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Schema for the PostgreSQL source: source override, then database, then `public`.
    pub fn resolved_schema(&self) -> &str {
        self.pipeline
            .source
            .schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.database
                    .as_ref()
                    .and_then(|db| db.schema.as_deref())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or("public")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
