//! Inference-backed notification decisions with deterministic fallback.

pub mod parser;
pub mod prompts;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::fallback_verdict;
use crate::retrieval::NotificationContext;
use crate::traits::{GenerationOptions, Llm, ResponseFormat};
use crate::types::Verdict;

/// Inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Per-call deadline.
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            temperature: 0.1,
            max_tokens: 400,
        }
    }
}

/// Why inference did not produce the decision.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackCause {
    Timeout,
    Unavailable(String),
    InvalidOutput(String),
}

impl std::fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "inference timed out"),
            Self::Unavailable(e) => write!(f, "inference unavailable: {}", e),
            Self::InvalidOutput(e) => write!(f, "invalid inference output: {}", e),
        }
    }
}

/// Result of a decision call.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Inferred(Verdict),
    Fallback { verdict: Verdict, cause: FallbackCause },
}

/// Calls the inference backend and validates its answer.
pub struct InferenceDecisionMaker {
    llm: Arc<dyn Llm>,
    config: InferenceConfig,
}

impl InferenceDecisionMaker {
    pub fn new(llm: Arc<dyn Llm>, config: InferenceConfig) -> Self {
        Self { llm, config }
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            response_format: Some(ResponseFormat::Json),
        }
    }

    /// Decide for a context. Malformed output is retried once with a stricter
    /// prompt; timeouts, backend errors and a second malformed answer fall
    /// back to the deterministic rules.
    pub async fn decide(&self, context: &NotificationContext) -> InferenceOutcome {
        let deadline = Duration::from_secs(self.config.timeout_secs);
        let mut last_error = String::new();

        for attempt in 0..2 {
            let messages = prompts::build_messages(context, attempt > 0);
            let started = Instant::now();

            let response = match tokio::time::timeout(
                deadline,
                self.llm.generate(&messages, Some(self.options())),
            )
            .await
            {
                Err(_) => return self.fallback(context, FallbackCause::Timeout),
                Ok(Err(e)) => return self.fallback(context, FallbackCause::Unavailable(e.to_string())),
                Ok(Ok(response)) => response,
            };

            match parser::parse_verdict(response.content_or_empty()) {
                Ok(verdict) => {
                    debug!(
                        conversation_id = %context.conversation_id,
                        user_id = %context.identity.user_id,
                        model = self.llm.model_name(),
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        should_notify = verdict.should_notify,
                        "Inference decision parsed"
                    );
                    return InferenceOutcome::Inferred(verdict);
                }
                Err(e) => {
                    warn!(
                        conversation_id = %context.conversation_id,
                        attempt,
                        error = %e,
                        "Malformed inference output"
                    );
                    last_error = e.to_string();
                }
            }
        }

        self.fallback(context, FallbackCause::InvalidOutput(last_error))
    }

    fn fallback(&self, context: &NotificationContext, cause: FallbackCause) -> InferenceOutcome {
        warn!(
            conversation_id = %context.conversation_id,
            user_id = %context.identity.user_id,
            cause = %cause,
            "Falling back to heuristic decision"
        );
        let verdict = fallback_verdict(&context.unread, &context.classifier_profile());
        InferenceOutcome::Fallback { verdict, cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HushError, HushResult};
    use crate::traits::LlmResponse;
    use crate::types::{ChatMessage, Message, Priority, UserIdentity, UserNotificationPreferences};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Replays canned replies, recording how many calls were made.
    struct Scripted {
        replies: Mutex<Vec<HushResult<String>>>,
        calls: Mutex<Vec<Vec<Message>>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(replies: Vec<HushResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Llm for Scripted {
        async fn generate(
            &self,
            messages: &[Message],
            _options: Option<GenerationOptions>,
        ) -> HushResult<LlmResponse> {
            self.calls.lock().unwrap().push(messages.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let reply = self.replies.lock().unwrap().remove(0);
            reply.map(LlmResponse::text)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn context(text: &str) -> NotificationContext {
        NotificationContext::minimal(
            "conv-1",
            UserIdentity::new("alice", "alice", "Alice"),
            vec![ChatMessage::new("m1", "conv-1", "bob", "Bob", text, Utc::now())],
            UserNotificationPreferences::defaults_for("alice").with_keywords(["urgent"]),
            None,
        )
    }

    const GOOD: &str = r#"{"should_notify": true, "reason": "deadline", "notification_text": "Report due today", "priority": "medium"}"#;

    #[tokio::test]
    async fn test_inferred_on_valid_output() {
        let llm = Arc::new(Scripted::new(vec![Ok(GOOD.to_string())]));
        let maker = InferenceDecisionMaker::new(llm.clone(), InferenceConfig::default());
        let outcome = maker.decide(&context("report due today")).await;
        assert!(matches!(outcome, InferenceOutcome::Inferred(ref v) if v.priority == Priority::Medium));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_once_with_strict_prompt() {
        let llm = Arc::new(Scripted::new(vec![
            Ok("sure thing!".to_string()),
            Ok(GOOD.to_string()),
        ]));
        let maker = InferenceDecisionMaker::new(llm.clone(), InferenceConfig::default());
        let outcome = maker.decide(&context("report due today")).await;
        assert!(matches!(outcome, InferenceOutcome::Inferred(_)));
        assert_eq!(llm.calls(), 2);
        let second = &llm.calls.lock().unwrap()[1];
        assert_eq!(second.last().unwrap().content, prompts::STRICT_FORMAT_REMINDER);
    }

    #[tokio::test]
    async fn test_falls_back_after_second_malformed_output() {
        let llm = Arc::new(Scripted::new(vec![Ok("nope".into()), Ok("{\"bad\": 1}".into())]));
        let maker = InferenceDecisionMaker::new(llm.clone(), InferenceConfig::default());
        let outcome = maker.decide(&context("this is urgent")).await;
        match outcome {
            InferenceOutcome::Fallback { verdict, cause } => {
                assert!(matches!(cause, FallbackCause::InvalidOutput(_)));
                assert!(verdict.should_notify);
                assert_eq!(verdict.priority, Priority::Medium);
                assert!(verdict.reason.starts_with("fallback: "));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_falls_back_on_backend_error() {
        let llm = Arc::new(Scripted::new(vec![Err(HushError::llm("connection refused"))]));
        let maker = InferenceDecisionMaker::new(llm.clone(), InferenceConfig::default());
        let outcome = maker.decide(&context("nothing special here")).await;
        match outcome {
            InferenceOutcome::Fallback { verdict, cause } => {
                assert!(matches!(cause, FallbackCause::Unavailable(_)));
                assert!(!verdict.should_notify);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_on_timeout() {
        let mut scripted = Scripted::new(vec![Ok(GOOD.to_string())]);
        scripted.delay = Some(Duration::from_secs(60));
        let maker = InferenceDecisionMaker::new(Arc::new(scripted), InferenceConfig::default());
        let outcome = maker.decide(&context("this is urgent")).await;
        assert!(matches!(
            outcome,
            InferenceOutcome::Fallback {
                cause: FallbackCause::Timeout,
                ..
            }
        ));
    }
}
