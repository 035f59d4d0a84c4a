// Data-source seams.
//
// ReportSource is everything the pipeline reads; ActionLog is everything the
// mutation endpoints write. The warehouse crate implements both; tests use
// in-memory doubles.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{RawReport, ReportQuery, UrlPattern};

#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Report rows submitted within the query window, shaped for the query's view.
    async fn reports(&self, query: &ReportQuery) -> Result<Vec<RawReport>>;

    /// Every URL pattern in the knowledge base, joined to its bug title.
    async fn url_patterns(&self, project_id: &str) -> Result<Vec<UrlPattern>>;
}

/// Append-only audit log of reviewer activity.
#[async_trait]
pub trait ActionLog: Send + Sync {
    /// Record a moderation action (hide, mark-invalid, mark-duplicate, ...).
    async fn insert_action(&self, report_uuid: &str, action_type: &str) -> Result<()>;

    /// Record a human (non-ML) label.
    async fn insert_label(&self, report_uuid: &str, label: &str) -> Result<()>;
}
