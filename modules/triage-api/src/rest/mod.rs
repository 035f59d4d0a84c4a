pub mod actions;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info};

use triage_common::{PredictionFilter, ReportQuery, ReportView};

use crate::error::ApiError;
use crate::AppState;

// --- Query structs ---

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassifiedQuery {
    from: Option<String>,
    to: Option<String>,
    prediction: Option<String>,
}

// --- Report views ---

pub async fn api_user_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> Result<Response, ApiError> {
    handle_report(&state, params.from, params.to, ReportView::UserReports).await
}

pub async fn api_inconsistent_entries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> Result<Response, ApiError> {
    handle_report(&state, params.from, params.to, ReportView::InconsistentEntries).await
}

pub async fn api_classified_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClassifiedQuery>,
) -> Result<Response, ApiError> {
    let filter = PredictionFilter::parse(params.prediction.as_deref())?;
    handle_report(&state, params.from, params.to, ReportView::Classified(filter)).await
}

/// Validate the window, hand the job to the report worker and return its JSON untouched.
async fn handle_report(
    state: &AppState,
    from: Option<String>,
    to: Option<String>,
    view: ReportView,
) -> Result<Response, ApiError> {
    let query = ReportQuery::parse(&state.project_id, from.as_deref(), to.as_deref(), view)?;

    let started = Instant::now();
    let body = state.worker.fetch(query).await.map_err(|e| {
        error!(%view, error = %e, "Report handler failed");
        ApiError::from(e)
    })?;
    info!(
        %view,
        bytes = body.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Report handler done"
    );

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
