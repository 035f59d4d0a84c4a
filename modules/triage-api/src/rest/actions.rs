use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::auth::WriteAccess;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackActionRequest {
    report_uuid: Option<String>,
    #[serde(rename = "type")]
    action_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLabelRequest {
    report_uuid: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkInvalidRequest {
    report_uuid: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn created() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({ "status": "success" })))
}

fn write_failed(err: anyhow::Error) -> ApiError {
    error!(error = %format!("{err:#}"), "Warehouse write failed");
    ApiError::internal(format!("{err:#}"))
}

pub async fn api_track_action(
    access: WriteAccess,
    State(state): State<Arc<AppState>>,
    body: Result<Json<TrackActionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let (Some(report_uuid), Some(action_type)) =
        (present(&body.report_uuid), present(&body.action_type))
    else {
        return Err(ApiError::bad_request("Missing report_uuid or type"));
    };

    info!(report_uuid, action_type, user = ?access.email, "Tracking action");
    state
        .actions
        .insert_action(report_uuid, action_type)
        .await
        .map_err(write_failed)?;

    Ok(created())
}

/// Store a human label and record the matching `mark-<label>` action.
pub async fn api_add_label(
    access: WriteAccess,
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddLabelRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let (Some(report_uuid), Some(label)) = (present(&body.report_uuid), present(&body.label))
    else {
        return Err(ApiError::bad_request("Missing report_uuid or label"));
    };

    info!(report_uuid, label, user = ?access.email, "Adding label");
    let action_type = format!("mark-{label}");
    tokio::try_join!(
        state.actions.insert_label(report_uuid, label),
        state.actions.insert_action(report_uuid, &action_type),
    )
    .map_err(write_failed)?;

    Ok(created())
}

pub async fn api_mark_invalid(
    access: WriteAccess,
    State(state): State<Arc<AppState>>,
    body: Result<Json<MarkInvalidRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let Some(report_uuid) = present(&body.report_uuid) else {
        return Err(ApiError::bad_request("Missing report_uuid"));
    };

    info!(report_uuid, user = ?access.email, "Marking report invalid");
    tokio::try_join!(
        state.actions.insert_action(report_uuid, "mark-invalid"),
        state.actions.insert_label(report_uuid, "invalid"),
    )
    .map_err(write_failed)?;

    Ok(created())
}
