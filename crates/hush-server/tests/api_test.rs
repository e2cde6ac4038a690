//! HTTP-level tests against an in-memory engine.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use hush_core::traits::{GenerationOptions, LlmResponse};
use hush_core::{
    Embedder, EngineConfig, EngineStores, HushResult, Llm, LoggingTransport, Message,
    NotificationEngine, SqliteStore,
};
use hush_server::{create_server, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

struct SkipLlm;

#[async_trait]
impl Llm for SkipLlm {
    async fn generate(
        &self,
        _messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> HushResult<LlmResponse> {
        Ok(LlmResponse::text(
            r#"{"should_notify": false, "reason": "routine chatter", "priority": "low"}"#,
        ))
    }

    fn model_name(&self) -> &str {
        "skip"
    }
}

struct ZeroEmbedder;

#[async_trait]
impl Embedder for ZeroEmbedder {
    async fn embed(&self, _text: &str) -> HushResult<Vec<f32>> {
        Ok(vec![0.0; 4])
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_name(&self) -> &str {
        "zero"
    }
}

fn app() -> Router {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = NotificationEngine::new(
        EngineConfig::default(),
        Arc::new(SkipLlm),
        Arc::new(ZeroEmbedder),
        EngineStores::sqlite(store.clone()),
        Arc::new(LoggingTransport),
    )
    .unwrap();
    create_server(AppState::new(Arc::new(engine), store))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed(app: &Router) {
    for (user, name) in [("alice", "Alice Smith"), ("bob", "Bob Jones")] {
        let (status, _) = send(
            app,
            "POST",
            "/conversations/conv-1/participants",
            Some(json!({"user_id": user, "display_name": name})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, body) = send(
        app,
        "POST",
        "/messages",
        Some(json!({
            "id": "m1",
            "conversation_id": "conv-1",
            "sender_id": "bob",
            "sender_name": "Bob Jones",
            "text": "@alice can you review the deploy checklist?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["stored"], true);
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["background"], false);
    assert!(body.get("tracked_users").is_none());
}

#[tokio::test]
async fn test_duplicate_message_is_not_stored_twice() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/messages",
        Some(json!({
            "id": "m1",
            "conversation_id": "conv-1",
            "sender_id": "bob",
            "text": "@alice can you review the deploy checklist?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], false);
}

#[tokio::test]
async fn test_analyze_then_feedback() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/conversations/conv-1/analyze",
        Some(json!({"user_id": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "inferred");
    assert_eq!(body["decision"]["should_notify"], true);
    assert_eq!(body["decision"]["priority"], "high");

    let (status, again) = send(
        &app,
        "POST",
        "/conversations/conv-1/analyze",
        Some(json!({"user_id": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["outcome"], "cached");

    let decision_id = body["decision"]["decision_id"].as_str().unwrap().to_string();
    let uri = format!("/decisions/{}/feedback", decision_id);

    let (status, record) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"user_id": "alice", "feedback": "helpful"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["feedback"], "helpful");

    let (status, error) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"user_id": "bob", "feedback": "not_helpful"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["error"]["code"], "PERM_001");

    let (status, decisions) = send(&app, "GET", "/users/alice/decisions?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decisions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_participant_is_forbidden() {
    let app = app();
    seed(&app).await;

    let (status, error) = send(
        &app,
        "POST",
        "/conversations/conv-1/analyze",
        Some(json!({"user_id": "mallory"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["error"]["code"], "PERM_001");
}

#[tokio::test]
async fn test_viewing_marks_conversation_read() {
    let app = app();
    seed(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        "/conversations/conv-1/viewing",
        Some(json!({"user_id": "alice", "viewing": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(
        &app,
        "POST",
        "/conversations/conv-1/analyze",
        Some(json!({"user_id": "alice", "regenerate": true})),
    )
    .await;
    assert_eq!(body["outcome"], "suppressed");
    assert_eq!(body["suppression_reason"], "nothing_unread");
}

#[tokio::test]
async fn test_messages_seen_while_viewing_stay_read() {
    let app = app();
    seed(&app).await;

    let viewing = |on: bool| json!({"user_id": "alice", "viewing": on});
    send(&app, "POST", "/conversations/conv-1/viewing", Some(viewing(true))).await;
    send(
        &app,
        "POST",
        "/messages",
        Some(json!({
            "id": "m2",
            "conversation_id": "conv-1",
            "sender_id": "bob",
            "sender_name": "Bob",
            "text": "@alice please check the deploy log"
        })),
    )
    .await;
    send(&app, "POST", "/conversations/conv-1/viewing", Some(viewing(false))).await;

    let later = Utc::now() + Duration::seconds(5);
    send(
        &app,
        "POST",
        "/messages",
        Some(json!({
            "id": "m3",
            "conversation_id": "conv-1",
            "sender_id": "bob",
            "sender_name": "Bob",
            "text": "the build finished",
            "created_at": later.to_rfc3339()
        })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/conversations/conv-1/analyze",
        Some(json!({"user_id": "alice", "regenerate": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"]["source_message_ids"], json!(["m3"]));
    assert_eq!(body["decision"]["should_notify"], false);
}

#[tokio::test]
async fn test_preferences_round_trip_and_validation() {
    let app = app();

    let (status, defaults) = send(&app, "GET", "/users/alice/preferences", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["enabled"], true);

    let (status, updated) = send(
        &app,
        "PUT",
        "/users/alice/preferences",
        Some(json!({"priority_keywords": ["outage", " deploy "]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["priority_keywords"], json!(["deploy", "outage"]));
    assert_eq!(
        updated["message_count_threshold"],
        defaults["message_count_threshold"]
    );

    let (status, error) = send(
        &app,
        "PUT",
        "/users/alice/preferences",
        Some(json!({"message_count_threshold": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("message_count_threshold"));
}

#[tokio::test]
async fn test_profile_after_learning() {
    let app = app();

    let (status, _) = send(&app, "GET", "/users/alice/profile", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, profile) = send(&app, "POST", "/users/alice/learn", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["feedback_count"], 0);

    let (status, _) = send(&app, "GET", "/users/alice/profile", None).await;
    assert_eq!(status, StatusCode::OK);
}
