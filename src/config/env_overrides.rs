use super::{DatabaseConfig, IngestConfig, LogFormat, SourceType, StorageBackend};
use ingest2parquet_core::{IngestError, Result};

pub const ENV_PREFIX: &str = "INGEST2PARQUET_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the INGEST2PARQUET_ prefix
    /// Used for libpq standard variables (PGPASSWORD)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (above the file, below CLI flags).
pub fn apply_env_overrides<E: EnvSource>(config: &mut IngestConfig, env: &E) -> Result<()> {
    // Source selection
    if let Some(source_type) = get_env_string(env, "SOURCE_TYPE") {
        config.pipeline.source_type = source_type.parse::<SourceType>()?;
    }
    if let Some(page_size) = get_env_usize(env, "PAGE_SIZE")? {
        config.pipeline.source.page_size = page_size;
    }

    // Target
    if let Some(storage) = get_env_string(env, "TARGET_STORAGE") {
        config.pipeline.target.storage = storage.parse::<StorageBackend>()?;
    }
    if let Some(bucket) = get_env_string(env, "TARGET_BUCKET") {
        config.pipeline.target.bucket = bucket;
    }
    if let Some(path) = get_env_string(env, "TARGET_PATH") {
        config.pipeline.target.path = path;
    }
    if let Some(credentials) = get_env_string(env, "CREDENTIALS_PATH") {
        config.pipeline.target.credentials_path = Some(credentials);
    }

    // Database
    if let Some(host) = get_env_string(env, "DB_HOST") {
        ensure_database(config).host = host;
    }
    if let Some(port) = get_env_u16(env, "DB_PORT")? {
        ensure_database(config).port = port;
    }
    if let Some(name) = get_env_string(env, "DB_NAME") {
        ensure_database(config).database = name;
    }
    if let Some(user) = get_env_string(env, "DB_USER") {
        ensure_database(config).user = user;
    }
    if let Some(password) = get_env_string(env, "DB_PASSWORD") {
        ensure_database(config).password = password;
    } else if let Some(password) = get_raw_env_string(env, "PGPASSWORD") {
        // libpq convention; only fills a password the file left empty
        if let Some(db) = config.database.as_mut() {
            if db.password.is_empty() {
                db.password = password;
            }
        }
    }
    if let Some(schema) = get_env_string(env, "DB_SCHEMA") {
        ensure_database(config).schema = Some(schema);
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn ensure_database(config: &mut IngestConfig) -> &mut DatabaseConfig {
    config.database.get_or_insert_with(DatabaseConfig::default)
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|val| !val.is_empty())
}

/// Get a raw environment variable without the INGEST2PARQUET_ prefix
fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key).filter(|val| !val.is_empty())
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.parse::<usize>().map_err(|e| {
                IngestError::config(format!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u16<E: EnvSource>(env: &E, key: &str) -> Result<Option<u16>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.parse::<u16>().map_err(|e| {
                IngestError::config(format!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
