//! Conversation endpoints: participants, viewer state and on-demand analysis.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use hush_core::types::{AnalysisOutcome, NotificationDecision, SuppressionReason, UserIdentity};
use hush_core::AnalyzeOptions;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for registering a participant.
#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: String,
    /// Defaults to the user id.
    #[serde(default)]
    pub handle: Option<String>,
    /// Defaults to the user id.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Register a user as a participant and record how they are addressed.
/// POST /conversations/:id/participants
pub async fn add_participant(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<AddParticipantRequest>,
) -> ApiResult<StatusCode> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::validation("user_id must not be empty"));
    }

    let identity = UserIdentity::new(
        request.user_id.clone(),
        request.handle.unwrap_or_else(|| request.user_id.clone()),
        request.display_name.unwrap_or_else(|| request.user_id.clone()),
    );
    state.store.upsert_user(&identity)?;
    state.store.add_participant(&conversation_id, &identity.user_id)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ViewingRequest {
    pub user_id: String,
    pub viewing: bool,
}

/// Record that a user opened or left a conversation.
/// POST /conversations/:id/viewing
pub async fn set_viewing(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ViewingRequest>,
) -> ApiResult<StatusCode> {
    state
        .set_viewing(&request.user_id, &conversation_id, request.viewing)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: String,
    /// Ignore any cached decision.
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// `cached`, `inferred`, `fallback_heuristic` or `suppressed`.
    pub outcome: &'static str,
    pub decision: NotificationDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_since_cache: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<SuppressionReason>,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        let kind = outcome.kind();
        let (messages_since_cache, suppression_reason) = match &outcome {
            AnalysisOutcome::Cached {
                messages_since_cache,
                ..
            } => (Some(*messages_since_cache), None),
            AnalysisOutcome::Suppressed { reason, .. } => (None, Some(*reason)),
            _ => (None, None),
        };
        Self {
            outcome: kind,
            decision: outcome.into_decision(),
            messages_since_cache,
            suppression_reason,
        }
    }
}

/// Analyze a conversation on behalf of a participant.
/// POST /conversations/:id/analyze
pub async fn analyze(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let outcome = state
        .engine
        .analyze(
            &conversation_id,
            &request.user_id,
            AnalyzeOptions {
                regenerate: request.regenerate,
            },
        )
        .await?;
    Ok(Json(outcome.into()))
}
