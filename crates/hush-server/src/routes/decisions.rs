//! Decision feedback endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use hush_core::types::{Feedback, FeedbackRecord};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub feedback: Feedback,
}

/// Rate a decision as helpful or not helpful.
/// POST /decisions/:id/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<Json<FeedbackRecord>> {
    let record = state
        .engine
        .submit_feedback(&request.user_id, &decision_id, request.feedback)?;
    Ok(Json(record))
}
