//! Per-user endpoints: preferences, learned profile and decision history.

use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use hush_core::types::{
    FallbackStrategy, NotificationDecision, QuietHours, UserNotificationPreferences,
    UserNotificationProfile,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_DECISION_LIMIT: usize = 20;
const MAX_DECISION_LIMIT: usize = 200;

/// Get preferences, falling back to defaults for unknown users.
/// GET /users/:id/preferences
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserNotificationPreferences>> {
    Ok(Json(state.engine.get_preferences(&user_id)?))
}

/// Partial preference update. Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub enabled: Option<bool>,
    pub pause_threshold_seconds: Option<u64>,
    pub message_count_threshold: Option<u32>,
    pub priority_keywords: Option<BTreeSet<String>>,
    /// `null` clears quiet hours.
    #[serde(default, deserialize_with = "double_option")]
    pub quiet_hours: Option<Option<QuietHours>>,
    pub max_analyses_per_hour: Option<u32>,
    pub fallback_strategy: Option<FallbackStrategy>,
}

impl UpdatePreferencesRequest {
    fn apply(self, preferences: &mut UserNotificationPreferences) {
        if let Some(enabled) = self.enabled {
            preferences.enabled = enabled;
        }
        if let Some(secs) = self.pause_threshold_seconds {
            preferences.pause_threshold_seconds = secs;
        }
        if let Some(count) = self.message_count_threshold {
            preferences.message_count_threshold = count;
        }
        if let Some(keywords) = self.priority_keywords {
            preferences.priority_keywords = keywords;
        }
        if let Some(quiet_hours) = self.quiet_hours {
            preferences.quiet_hours = quiet_hours;
        }
        if let Some(max) = self.max_analyses_per_hour {
            preferences.max_analyses_per_hour = max;
        }
        if let Some(strategy) = self.fallback_strategy {
            preferences.fallback_strategy = strategy;
        }
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Update preferences. Cached decisions for the user stop matching and the
/// activity monitor reloads its thresholds.
/// PUT /users/:id/preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> ApiResult<Json<UserNotificationPreferences>> {
    let mut preferences = state.engine.get_preferences(&user_id)?;
    request.apply(&mut preferences);

    let stored = state.engine.update_preferences(preferences)?;
    state.preferences_changed(&user_id).await?;
    Ok(Json(stored))
}

/// Get the learned profile.
/// GET /users/:id/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserNotificationProfile>> {
    state
        .engine
        .get_profile(&user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No learned profile for user {}", user_id)))
}

/// Recompute the learned profile now instead of waiting for the scheduled run.
/// POST /users/:id/learn
pub async fn learn(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserNotificationProfile>> {
    let learner = state.engine.learner().clone();
    let profile = tokio::task::spawn_blocking(move || learner.run_for_user(&user_id))
        .await
        .map_err(|e| ApiError::internal(format!("Learner task failed: {}", e)))??;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub limit: Option<usize>,
}

/// Most recent decisions, newest first.
/// GET /users/:id/decisions
pub async fn recent_decisions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<DecisionsQuery>,
) -> ApiResult<Json<Vec<NotificationDecision>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DECISION_LIMIT)
        .clamp(1, MAX_DECISION_LIMIT);
    Ok(Json(state.engine.recent_decisions(&user_id, limit)?))
}
