//! Route definitions for the REST API.

mod conversations;
mod decisions;
mod health;
mod messages;
mod users;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Message ingestion
        .route("/messages", post(messages::post_message))
        // Conversations
        .route(
            "/conversations/:id/participants",
            post(conversations::add_participant),
        )
        .route("/conversations/:id/viewing", post(conversations::set_viewing))
        .route("/conversations/:id/analyze", post(conversations::analyze))
        // Decisions
        .route("/decisions/:id/feedback", post(decisions::submit_feedback))
        // Users
        .route(
            "/users/:id/preferences",
            get(users::get_preferences).put(users::update_preferences),
        )
        .route("/users/:id/profile", get(users::get_profile))
        .route("/users/:id/learn", post(users::learn))
        .route("/users/:id/decisions", get(users::recent_decisions))
        .with_state(state)
}

pub use conversations::*;
pub use decisions::*;
pub use health::*;
pub use messages::*;
pub use users::*;
