//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Whether the activity monitor and learner are running.
    pub background: bool,
    /// Users the activity monitor tracks. Absent without a monitor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_users: Option<usize>,
    pub version: String,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        background: state.has_runtime().await,
        tracked_users: state.tracked_users().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
