//! BigQuery backend over the `jobs.query` REST API.

use super::auth::{self, CredentialsFile};
use super::{ExecutionReport, Warehouse};
use crate::config::EnvSource;
use async_trait::async_trait;
use ingest2parquet_core::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Server-side wait per `getQueryResults` call
const POLL_TIMEOUT_MS: u64 = 10_000;
/// Upper bound on polls for one statement (about an hour at the server wait)
const MAX_POLLS: usize = 360;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_query_cache: Option<bool>,
    timeout_ms: u64,
}

impl<'a> QueryRequest<'a> {
    fn new(query: &'a str, dry_run: bool) -> Self {
        Self {
            query,
            use_legacy_sql: false,
            dry_run,
            use_query_cache: dry_run.then_some(false),
            timeout_ms: POLL_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{}: {}", reason, message),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: Option<bool>,
    /// int64 values arrive as JSON strings
    #[serde(default)]
    total_bytes_processed: Option<String>,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
    #[serde(default)]
    errors: Option<Vec<ErrorProto>>,
}

impl QueryResponse {
    fn is_complete(&self, dry_run: bool) -> bool {
        dry_run || self.job_complete.unwrap_or(true)
    }

    fn job_id(&self) -> Option<&str> {
        self.job_reference.as_ref().and_then(|r| r.job_id.as_deref())
    }

    fn report(&self) -> ExecutionReport {
        ExecutionReport {
            job_id: self.job_id().map(str::to_string),
            bytes_processed: self
                .total_bytes_processed
                .as_deref()
                .and_then(|b| b.parse().ok()),
            affected_rows: self
                .num_dml_affected_rows
                .as_deref()
                .and_then(|r| r.parse().ok()),
        }
    }

    fn first_error(&self) -> Option<String> {
        self.errors
            .as_ref()
            .filter(|errors| !errors.is_empty())
            .map(|errors| {
                errors
                    .iter()
                    .map(ErrorProto::describe)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Runs statements as BigQuery query jobs.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    base_url: String,
    project: String,
    access_token: String,
}

impl BigQueryWarehouse {
    pub fn new(client: reqwest::Client, project: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            project: project.into(),
            access_token: access_token.into(),
        }
    }

    /// Point at a different API root (emulators, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Resolve credentials and project, then fetch an access token.
    pub async fn connect<E: EnvSource>(
        credentials: Option<&Path>,
        project: Option<&str>,
        env: &E,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ingest2parquet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::connection("BigQuery", e))?;

        let path = auth::credentials_path(credentials, env);
        let creds = match path.as_deref() {
            Some(path) => Some(CredentialsFile::load(path)?),
            None => None,
        };

        let project = auth::resolve_project(project, env, creds.as_ref())?;
        let token = auth::fetch_access_token(path.as_deref().zip(creds.as_ref()), env).await?;

        Ok(Self::new(client, project, token))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<QueryResponse> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| IngestError::connection("BigQuery", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IngestError::connection("BigQuery", e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| body.trim().to_string());
            return Err(IngestError::warehouse(format!("{} ({})", message, status)));
        }

        serde_json::from_str(&body)
            .map_err(|e| IngestError::warehouse(format!("Invalid BigQuery response: {}", e)))
    }

    async fn poll(&self, job: &JobReference) -> Result<QueryResponse> {
        let job_id = job
            .job_id
            .as_deref()
            .ok_or_else(|| IngestError::warehouse("Incomplete job has no job id"))?;
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, self.project, job_id
        );

        let mut query = vec![
            ("timeoutMs", POLL_TIMEOUT_MS.to_string()),
            ("maxResults", "0".to_string()),
        ];
        if let Some(location) = &job.location {
            query.push(("location", location.clone()));
        }

        for attempt in 1..=MAX_POLLS {
            let response = self.send(self.client.get(&url).query(&query)).await?;
            if response.job_complete.unwrap_or(false) {
                return Ok(response);
            }
            debug!(job_id, attempt, "Job still running");
        }

        Err(IngestError::warehouse(format!(
            "Job {} did not complete after {} polls",
            job_id, MAX_POLLS
        )))
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn name(&self) -> String {
        format!("bigquery:{}", self.project)
    }

    async fn execute(&self, sql: &str, dry_run: bool) -> Result<ExecutionReport> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project);
        let body = QueryRequest::new(sql, dry_run);

        let mut response = self.send(self.client.post(&url).json(&body)).await?;

        if !response.is_complete(dry_run) {
            let job = response.job_reference.take().unwrap_or_default();
            response = self.poll(&job).await?;
        }

        if let Some(message) = response.first_error() {
            return Err(IngestError::warehouse(message));
        }

        Ok(response.report())
    }
}
