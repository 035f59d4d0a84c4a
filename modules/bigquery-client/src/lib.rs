pub mod error;
pub mod types;

pub use error::{BigQueryError, Result};
pub use types::{decode_rows, FieldSchema, JobReference, QueryRequest, QueryResponse, TableSchema};

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use types::MetadataToken;

const BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Token endpoint of the GCE/GKE metadata server.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh metadata tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A fixed token, e.g. from `gcloud auth print-access-token`.
    Static(String),
    /// The metadata server of the VM or pod the service runs on.
    Metadata,
}

pub struct BigQueryClient {
    client: reqwest::Client,
    base_url: String,
    location: Option<String>,
    token_source: TokenSource,
    cached_token: Mutex<Option<(String, Instant)>>,
}

impl BigQueryClient {
    pub fn new(token_source: TokenSource) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            location: None,
            token_source,
            cached_token: Mutex::new(None),
        }
    }

    /// Point the client at a different API root (emulators, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Dataset location used for jobs, e.g. `US`.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    /// Run a SELECT and return one JSON object per row, keyed by column name.
    pub async fn query(&self, project_id: &str, sql: &str, params: &[&str]) -> Result<Vec<Value>> {
        let (schema, rows) = self.run_to_completion(project_id, sql, params).await?;
        let schema = schema.unwrap_or_default();
        let decoded = decode_rows(&schema, &rows)?;
        tracing::debug!(project_id, rows = decoded.len(), "Query finished");
        Ok(decoded)
    }

    /// Run a DML statement and return the number of affected rows.
    pub async fn execute(&self, project_id: &str, sql: &str, params: &[&str]) -> Result<u64> {
        let request = QueryRequest::positional(sql, params, self.location.as_deref());
        let mut page = self.post_query(project_id, &request).await?;
        while !page.job_complete {
            let job = page
                .job_reference
                .clone()
                .ok_or_else(|| BigQueryError::Parse("incomplete job without jobReference".into()))?;
            tracing::debug!(job_id = %job.job_id, "DML job still running");
            page = self.get_query_results(&job, None).await?;
        }
        Ok(page
            .num_dml_affected_rows
            .as_deref()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0))
    }

    /// Start a query and keep polling `getQueryResults` until the job is
    /// complete and every page has been read.
    async fn run_to_completion(
        &self,
        project_id: &str,
        sql: &str,
        params: &[&str],
    ) -> Result<(Option<TableSchema>, Vec<types::TableRow>)> {
        let request = QueryRequest::positional(sql, params, self.location.as_deref());
        let mut page = self.post_query(project_id, &request).await?;
        let job = page.job_reference.clone();

        let mut schema = None;
        let mut rows = Vec::new();
        loop {
            let next_token = if page.job_complete {
                if schema.is_none() {
                    schema = page.schema.take();
                }
                rows.append(&mut page.rows);
                match page.page_token.take() {
                    Some(token) => Some(token),
                    None => break,
                }
            } else {
                None
            };

            let job = job
                .as_ref()
                .ok_or_else(|| BigQueryError::Parse("paged response without jobReference".into()))?;
            if next_token.is_none() {
                tracing::debug!(job_id = %job.job_id, "Query job still running");
            }
            page = self.get_query_results(job, next_token.as_deref()).await?;
        }

        Ok((schema, rows))
    }

    async fn post_query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryResponse> {
        let url = format!("{}/projects/{}/queries", self.base_url, project_id);
        let token = self.token().await?;
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, job.project_id, job.job_id
        );
        let mut query: Vec<(&str, &str)> = vec![("timeoutMs", "10000")];
        if let Some(location) = job.location.as_deref().or(self.location.as_deref()) {
            query.push(("location", location));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let token = self.token().await?;
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn token(&self) -> Result<String> {
        match &self.token_source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata => {
                let mut cached = self.cached_token.lock().await;
                if let Some((token, expires)) = cached.as_ref() {
                    if Instant::now() + TOKEN_EXPIRY_MARGIN < *expires {
                        return Ok(token.clone());
                    }
                }

                let resp = self
                    .client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| BigQueryError::Auth(e.to_string()))?;
                let resp = check_status(resp).await?;
                let token: MetadataToken = resp.json().await?;
                tracing::debug!(expires_in = token.expires_in, "Fetched metadata access token");

                let expires = Instant::now() + Duration::from_secs(token.expires_in);
                *cached = Some((token.access_token.clone(), expires));
                Ok(token.access_token)
            }
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BigQueryError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}
