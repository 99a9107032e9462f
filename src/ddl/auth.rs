//! Google credentials for the BigQuery REST API.
//!
//! Access token sources, first match wins:
//! 1. `GOOGLE_OAUTH_ACCESS_TOKEN`
//! 2. A credentials file (`--credentials`, then `GOOGLE_APPLICATION_CREDENTIALS`,
//!    then the gcloud application-default file) of type `service_account` or
//!    `authorized_user`
//! 3. The GCE metadata server

use crate::config::EnvSource;
use ingest2parquet_core::{IngestError, Result};
use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes;
use yup_oauth2::{
    AccessToken, ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts,
    AuthorizedUserAuthenticator, ServiceAccountAuthenticator,
};

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const PROJECT_ENVS: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

/// OAuth scopes requested for BigQuery jobs
pub const BIGQUERY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];

const USER_TOKEN_TARGET: &str = "Google OAuth token endpoint";
const METADATA_TARGET: &str = "GCE metadata server";

/// The fields we read from a Google credentials JSON file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsFile {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl CredentialsFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(IngestError::not_found(
                "Credentials file",
                path.display().to_string(),
            ));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!(
                "Failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            IngestError::config(format!(
                "Failed to parse credentials file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Project named by the file, if any
    pub fn project(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .or(self.quota_project_id.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// gcloud's application-default credentials file
fn gcloud_adc_path() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        dirs::config_dir()
    } else {
        dirs::home_dir().map(|home| home.join(".config"))
    };
    base.map(|dir| dir.join("gcloud").join("application_default_credentials.json"))
}

/// Locate a credentials file: explicit path, then env, then gcloud's default.
///
/// An explicit path is returned even when missing so loading reports it.
pub fn credentials_path<E: EnvSource>(explicit: Option<&Path>, env: &E) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.get_raw(CREDENTIALS_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    gcloud_adc_path().filter(|path| path.is_file())
}

/// Resolve the BigQuery project id.
pub fn resolve_project<E: EnvSource>(
    explicit: Option<&str>,
    env: &E,
    credentials: Option<&CredentialsFile>,
) -> Result<String> {
    if let Some(project) = explicit.filter(|p| !p.is_empty()) {
        return Ok(project.to_string());
    }

    for key in PROJECT_ENVS {
        if let Some(project) = env.get_raw(key).filter(|p| !p.is_empty()) {
            debug!("Using project {} from {}", project, key);
            return Ok(project);
        }
    }

    credentials
        .and_then(CredentialsFile::project)
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::config(
                "BigQuery project id is required.\n\
                Either:\n\
                1. Pass --project <id>\n\
                2. Or set GOOGLE_CLOUD_PROJECT\n\
                3. Or use a credentials file that names project_id or quota_project_id",
            )
        })
}

/// Obtain an OAuth access token for the BigQuery API.
pub async fn fetch_access_token<E: EnvSource>(
    credentials: Option<(&Path, &CredentialsFile)>,
    env: &E,
) -> Result<String> {
    if let Some(token) = env.get_raw(ACCESS_TOKEN_ENV).filter(|t| !t.is_empty()) {
        info!("Using access token from {}", ACCESS_TOKEN_ENV);
        return Ok(token);
    }

    install_crypto_provider();

    match credentials {
        Some((path, creds)) => match creds.kind.as_str() {
            "service_account" => {
                info!("Using service_account credentials from {}", path.display());
                service_account_token(path).await
            }
            "authorized_user" => {
                info!("Using authorized_user credentials from {}", path.display());
                authorized_user_token(path).await
            }
            other => Err(IngestError::config(format!(
                "Unsupported credentials type '{}' in {}.\n\
                Use a service_account key or run `gcloud auth application-default login`",
                other,
                path.display()
            ))),
        },
        None => {
            warn!("No credentials file found; trying the GCE metadata server");
            metadata_token().await
        }
    }
}

/// rustls needs a process-wide provider when more than one is compiled in.
fn install_crypto_provider() {
    // Err means one is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

async fn service_account_token(path: &Path) -> Result<String> {
    let key = yup_oauth2::read_service_account_key(path)
        .await
        .map_err(|e| invalid_credentials(path, e))?;
    let token_uri = key.token_uri.clone();

    let auth = ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| invalid_credentials(path, e))?;
    access_token(&token_uri, auth.token(BIGQUERY_SCOPES).await)
}

async fn authorized_user_token(path: &Path) -> Result<String> {
    let secret = yup_oauth2::read_authorized_user_secret(path)
        .await
        .map_err(|e| invalid_credentials(path, e))?;

    let auth = AuthorizedUserAuthenticator::builder(secret)
        .build()
        .await
        .map_err(|e| invalid_credentials(path, e))?;
    access_token(USER_TOKEN_TARGET, auth.token(BIGQUERY_SCOPES).await)
}

async fn metadata_token() -> Result<String> {
    let unavailable = |e: &dyn Display| {
        IngestError::connection(
            METADATA_TARGET,
            format!(
                "{}. No Google credentials found: pass --credentials, set {} or run `gcloud auth application-default login`",
                e, ACCESS_TOKEN_ENV
            ),
        )
    };

    let opts = ApplicationDefaultCredentialsFlowOpts::default();
    let token = match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
        ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => {
            let auth = builder.build().await.map_err(|e| unavailable(&e))?;
            auth.token(BIGQUERY_SCOPES).await
        }
        ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => {
            let auth = builder.build().await.map_err(|e| unavailable(&e))?;
            auth.token(BIGQUERY_SCOPES).await
        }
    };

    token
        .map_err(|e| unavailable(&e))
        .and_then(|token| access_token(METADATA_TARGET, Ok(token)))
}

fn invalid_credentials(path: &Path, reason: impl Display) -> IngestError {
    IngestError::config(format!(
        "Invalid credentials file {}: {}",
        path.display(),
        reason
    ))
}

fn access_token(
    target: &str,
    token: std::result::Result<AccessToken, yup_oauth2::Error>,
) -> Result<String> {
    let token = token.map_err(|e| IngestError::connection(target, e))?;
    debug!(expires_at = ?token.expiration_time(), "Obtained access token");
    token
        .token()
        .map(str::to_string)
        .ok_or_else(|| IngestError::connection(target, "token response had no access_token"))
}
