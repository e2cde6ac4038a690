//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hush_core::traits::{GenerationOptions, LlmResponse};
use hush_core::{
    ChatMessage, Embedder, EngineConfig, EngineStores, HushResult, Llm, Message,
    NotificationEngine, NotificationTransport, OutboundNotification, SqliteStore, UserIdentity,
};
use mockall::mock;

mock! {
    pub Transport {}

    #[async_trait]
    impl NotificationTransport for Transport {
        async fn deliver(&self, notification: &OutboundNotification) -> HushResult<()>;
    }
}

/// Llm that answers from a script and counts calls. When the script runs out
/// the last answer repeats. An optional delay simulates a slow backend.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answers within any realistic deadline.
    pub fn hanging() -> Self {
        Self {
            delay: Some(Duration::from_secs(3600)),
            ..Self::new(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn generate(
        &self,
        _messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> HushResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(LlmResponse::text(last.clone()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Embedder hashing characters into a small vector, so similar texts score high.
pub struct CharEmbedder;

#[async_trait]
impl Embedder for CharEmbedder {
    async fn embed(&self, text: &str) -> HushResult<Vec<f32>> {
        let mut vector = vec![0.0; 8];
        for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
            vector[c as usize % 8] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_name(&self) -> &str {
        "char-hash"
    }
}

pub const NOTIFY_PLANS: &str = r#"{"should_notify": true, "reason": "team plans", "notification_text": "Team lunch plans for Friday", "priority": "low"}"#;

pub const SKIP_CHATTER: &str =
    r#"{"should_notify": false, "reason": "casual chatter", "notification_text": null, "priority": "low"}"#;

pub struct Fixture {
    pub engine: NotificationEngine,
    pub store: Arc<SqliteStore>,
    pub llm: Arc<ScriptedLlm>,
}

/// Conversation "conv-1" between Alice (reader) and Bob.
pub fn fixture(
    llm: ScriptedLlm,
    transport: impl NotificationTransport + 'static,
    config: EngineConfig,
) -> Fixture {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store
        .upsert_user(&UserIdentity::new("alice", "alice", "Alice Smith"))
        .unwrap();
    store
        .upsert_user(&UserIdentity::new("bob", "bob", "Bob Jones"))
        .unwrap();
    store.add_participant("conv-1", "alice").unwrap();
    store.add_participant("conv-1", "bob").unwrap();

    let llm = Arc::new(llm);
    let engine = NotificationEngine::new(
        config,
        llm.clone(),
        Arc::new(CharEmbedder),
        EngineStores::sqlite(store.clone()),
        Arc::new(transport),
    )
    .unwrap();

    Fixture { engine, store, llm }
}

pub fn post(store: &SqliteStore, id: &str, sender: &str, text: &str, at: DateTime<Utc>) {
    let name = match sender {
        "alice" => "Alice",
        "bob" => "Bob",
        other => other,
    };
    store
        .insert_message(&ChatMessage::new(id, "conv-1", sender, name, text, at))
        .unwrap();
}
