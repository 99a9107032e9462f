// Configuration source loading.
//
// Priority order:
// 1. Environment variables (INGEST2PARQUET_* prefix, PGPASSWORD)
// 2. Config file given on the command line
// 3. Serde defaults

use super::env_overrides::{self, EnvSource, ENV_PREFIX};
use super::IngestConfig;
use ingest2parquet_core::{IngestError, Result};
use std::env;
use std::path::Path;

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<IngestConfig> {
    load_with_env(path, &StdEnvSource)
}

/// Load a config file and layer overrides from `env` on top.
pub fn load_with_env<E: EnvSource>(path: impl AsRef<Path>, env: &E) -> Result<IngestConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestError::not_found(
            "Config file",
            path.display().to_string(),
        ));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let extension = path.extension().and_then(|ext| ext.to_str());
    let mut config = parse_content(&content, extension).map_err(|e| match e {
        IngestError::Config { message, .. } => {
            IngestError::config(format!("{} ({})", message, path.display()))
        }
        other => other,
    })?;

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

/// Parse config content; `.toml` selects TOML, anything else is YAML.
pub(crate) fn parse_content(content: &str, extension: Option<&str>) -> Result<IngestConfig> {
    let is_toml = extension.is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(content)
            .map_err(|e| IngestError::config(format!("Failed to parse TOML config: {}", e)))
    } else if content.trim().is_empty() {
        Ok(IngestConfig::default())
    } else {
        serde_yaml::from_str(content)
            .map_err(|e| IngestError::config(format!("Failed to parse YAML config: {}", e)))
    }
}

/// Reads overrides from the process environment.
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
