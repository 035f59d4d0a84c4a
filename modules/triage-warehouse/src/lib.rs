//! BigQuery-backed implementations of the report source and the action log.

pub mod queries;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bigquery_client::BigQueryClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use triage_common::{ActionLog, RawReport, ReportQuery, ReportSource, UrlPattern};

pub struct Warehouse {
    client: BigQueryClient,
    project_id: String,
}

impl Warehouse {
    pub fn new(client: BigQueryClient, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
        }
    }

    async fn insert(&self, sql: &str, params: &[&str]) -> Result<()> {
        let affected = self.client.execute(&self.project_id, sql, params).await?;
        debug!(affected, "Insert finished");
        Ok(())
    }
}

#[async_trait]
impl ReportSource for Warehouse {
    async fn reports(&self, query: &ReportQuery) -> Result<Vec<RawReport>> {
        let sql = queries::reports_sql(query.view);
        let from = query.from.to_string();
        let until = query.window_end().to_string();

        info!(view = %query.view, %from, %until, "Querying reports");
        let rows = self
            .client
            .query(&query.project_id, &sql, &[from.as_str(), until.as_str()])
            .await?;
        decode_rows(rows).context("Unexpected report row shape")
    }

    async fn url_patterns(&self, project_id: &str) -> Result<Vec<UrlPattern>> {
        let rows = self
            .client
            .query(project_id, &queries::url_patterns_sql(), &[])
            .await?;
        decode_rows(rows).context("Unexpected URL pattern row shape")
    }
}

#[async_trait]
impl ActionLog for Warehouse {
    async fn insert_action(&self, report_uuid: &str, action_type: &str) -> Result<()> {
        info!(report_uuid, action_type, "Recording report action");
        self.insert(&queries::insert_action_sql(), &[report_uuid, action_type])
            .await
    }

    async fn insert_label(&self, report_uuid: &str, label: &str) -> Result<()> {
        info!(report_uuid, label, "Recording report label");
        self.insert(&queries::insert_label_sql(), &[report_uuid, label])
            .await
    }
}

/// Deserialize decoded rows into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| serde_json::from_value(row).with_context(|| format!("row {i}")))
        .collect()
}
