//! BigQuery REST adapter.
//!
//! Dry runs are issued as query jobs with `dryRun: true`; BigQuery plans the
//! query, returns the output schema in the job statistics and never runs it.
//! Existing relations are described through the tables endpoint.

use crate::schema::RawSchema;
use crate::warehouse::{
    QueryOutcome, RejectionKind, Warehouse, WarehouseError, WarehouseResult,
};
use async_trait::async_trait;
use dryrun_core::{Table, TableRef};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Message BigQuery returns when the planner gives up
pub const QUERY_TIMED_OUT: &str = "Dry run query timed out";

/// Connection settings
#[derive(Debug)]
pub struct BigQueryConfig {
    /// Project that owns the dry run jobs
    pub project: String,
    /// Job location, e.g. `EU`
    pub location: Option<String>,
    /// OAuth2 bearer token
    pub access_token: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
    /// REST endpoint
    pub base_url: String,
}

impl BigQueryConfig {
    /// Create a config with default timeout and endpoint
    #[must_use]
    pub fn new(project: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            project: project.into(),
            location: None,
            access_token,
            timeout: Duration::from_secs(60),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set the job location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point at another endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct JobResponse {
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    query: Option<QueryStatistics>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryStatistics {
    #[serde(default)]
    schema: Option<RawSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct TableResponse {
    #[serde(default)]
    schema: Option<RawSchema>,
}

/// Dry run adapter talking to the BigQuery REST API
pub struct BigQueryWarehouse {
    client: Client,
    config: BigQueryConfig,
}

impl BigQueryWarehouse {
    /// Build the HTTP client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialised
    pub fn new(config: BigQueryConfig) -> WarehouseResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Connection settings
    #[must_use]
    pub fn config(&self) -> &BigQueryConfig {
        &self.config
    }

    fn jobs_url(&self) -> String {
        format!("{}/projects/{}/jobs", self.config.base_url, self.config.project)
    }

    fn table_url(&self, table_ref: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.config.base_url, table_ref.database, table_ref.schema, table_ref.name
        )
    }

    /// Job insert body for a dry run of `sql`
    #[must_use]
    pub fn dry_run_request(&self, sql: &str) -> Value {
        let mut job_reference = json!({ "projectId": self.config.project });
        if let Some(location) = &self.config.location {
            job_reference["location"] = json!(location);
        }
        json!({
            "configuration": {
                "dryRun": true,
                "query": {
                    "query": sql,
                    "useQueryCache": false,
                    "useLegacySql": false
                }
            },
            "jobReference": job_reference
        })
    }
}

/// Error message from a BigQuery error body, or the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Map a failed job insert to an outcome or error
pub(crate) fn classify_query_failure(status: StatusCode, body: &str) -> WarehouseResult<QueryOutcome> {
    let message = error_message(body);
    let kind = match status {
        StatusCode::BAD_REQUEST => RejectionKind::BadRequest,
        StatusCode::FORBIDDEN => RejectionKind::Forbidden,
        StatusCode::NOT_FOUND => RejectionKind::NotFound,
        StatusCode::UNAUTHORIZED => return Err(WarehouseError::Auth { message }),
        _ => {
            return Err(WarehouseError::Transport {
                message: format!("{}: {}", status, message),
            });
        }
    };
    if message.contains(QUERY_TIMED_OUT) {
        return Err(WarehouseError::Timeout { message });
    }
    Ok(QueryOutcome::rejected(kind, message))
}

/// Map a successful job insert body to an outcome
pub(crate) fn parse_job_response(body: &str) -> WarehouseResult<QueryOutcome> {
    let response: JobResponse = serde_json::from_str(body).map_err(|e| WarehouseError::Decode {
        message: e.to_string(),
    })?;
    let schema = response
        .statistics
        .and_then(|s| s.query)
        .and_then(|q| q.schema)
        .unwrap_or_default();
    Ok(match schema.to_table() {
        Ok(table) => QueryOutcome::Success(table),
        Err(err) => QueryOutcome::rejected(RejectionKind::UnknownSchema, err.to_string()),
    })
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    #[instrument(skip_all)]
    async fn query(&self, sql: &str) -> WarehouseResult<QueryOutcome> {
        debug!(sql, "Submitting dry run job");
        let response = self
            .client
            .post(self.jobs_url())
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&self.dry_run_request(sql))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            parse_job_response(&body)
        } else {
            classify_query_failure(status, &body)
        }
    }

    #[instrument(skip(self), fields(table = %table_ref))]
    async fn get_node_schema(&self, table_ref: &TableRef) -> WarehouseResult<Option<Table>> {
        let response = self
            .client
            .get(self.table_url(table_ref))
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED => {
                return Err(WarehouseError::Auth {
                    message: error_message(&response.text().await?),
                });
            }
            _ => {}
        }
        let response = response.error_for_status()?;
        let table: TableResponse = response.json().await?;
        let schema = table.schema.unwrap_or_default();
        schema
            .to_table()
            .map(Some)
            .map_err(|e| WarehouseError::Decode {
                message: e.to_string(),
            })
    }
}
