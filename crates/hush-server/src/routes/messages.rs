//! Message ingestion endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use hush_core::types::ChatMessage;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for posting a message.
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    /// Client-assigned message id. Reposting the same id is a no-op.
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub text: String,
    /// Defaults to the time the server receives the message.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// User ids the client resolved as mentions.
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub id: String,
    /// False when the id was already stored.
    pub stored: bool,
}

/// Store a message and feed it to the activity monitor.
/// POST /messages
pub async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<PostMessageResponse>)> {
    for (field, value) in [
        ("id", &request.id),
        ("conversation_id", &request.conversation_id),
        ("sender_id", &request.sender_id),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::validation(format!("{} must not be empty", field)));
        }
    }

    let sender_name = request
        .sender_name
        .unwrap_or_else(|| request.sender_id.clone());
    let message = ChatMessage::new(
        request.id,
        request.conversation_id,
        request.sender_id,
        sender_name,
        request.text,
        request.created_at.unwrap_or_else(Utc::now),
    )
    .with_mentions(request.mentions);

    let stored = state.post_message(&message).await?;
    let status = if stored {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(PostMessageResponse {
            id: message.id,
            stored,
        }),
    ))
}
