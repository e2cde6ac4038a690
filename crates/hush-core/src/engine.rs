//! The notification engine: one analysis pipeline behind a small API.
//!
//! ```text
//! participant check -> preferences -> unread batch -> cache -> heuristics
//!     -> rate limit -> context retrieval -> inference (or fallback) -> log
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::activity::AnalysisRequest;
use crate::cache::{cache_key, DecisionCache, DecisionCacheStore};
use crate::classifier::{self, text, ClassifierProfile, Triage, EXCERPT_CHARS};
use crate::config::EngineConfig;
use crate::delivery::{notification_title, DeliveryPolicy, RateLimiter, ViewerRegistry};
use crate::error::{HushError, HushResult};
use crate::inference::{InferenceDecisionMaker, InferenceOutcome};
use crate::learner::Learner;
use crate::retrieval::ContextRetriever;
use crate::store::SqliteStore;
use crate::traits::{
    DecisionLog, Embedder, EmbeddingStore, FeedbackStore, Llm, MessageStore,
    NotificationTransport, PreferenceStore,
};
use crate::types::{
    AnalysisOutcome, ChatMessage, DecisionSource, DeliveryOutcome, FallbackStrategy, Feedback,
    FeedbackRecord, NotificationDecision, Priority, SuppressionReason, UserIdentity,
    UserNotificationPreferences, UserNotificationProfile, Verdict,
};

/// Storage collaborators of the engine.
#[derive(Clone)]
pub struct EngineStores {
    pub messages: Arc<dyn MessageStore>,
    pub embeddings: Arc<dyn EmbeddingStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub decisions: Arc<dyn DecisionLog>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub cache: Arc<dyn DecisionCacheStore>,
}

impl EngineStores {
    /// Every collaborator backed by one SQLite store.
    pub fn sqlite(store: Arc<SqliteStore>) -> Self {
        Self {
            messages: store.clone(),
            embeddings: store.clone(),
            preferences: store.clone(),
            decisions: store.clone(),
            feedback: store.clone(),
            cache: store,
        }
    }
}

/// Options for an on-demand analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Skip the cache lookup. The fresh decision still overwrites the entry.
    pub regenerate: bool,
}

/// An analysis together with the inputs delivery needs.
struct Analysis {
    outcome: AnalysisOutcome,
    batch: Vec<ChatMessage>,
    preferences: UserNotificationPreferences,
}

/// Removes a `(user, conversation)` pair from the in-flight set on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Decides whether unread conversation activity deserves a notification.
pub struct NotificationEngine {
    config: EngineConfig,
    messages: Arc<dyn MessageStore>,
    preferences: Arc<dyn PreferenceStore>,
    decisions: Arc<dyn DecisionLog>,
    feedback: Arc<dyn FeedbackStore>,
    retriever: ContextRetriever,
    inference: InferenceDecisionMaker,
    cache: DecisionCache,
    rate_limiter: RateLimiter,
    viewers: Arc<ViewerRegistry>,
    delivery: DeliveryPolicy,
    learner: Arc<Learner>,
    in_flight: Mutex<HashSet<(String, String)>>,
    /// Ids of decisions the transport accepted.
    delivered: Mutex<HashSet<String>>,
}

impl NotificationEngine {
    /// Create an engine from its configuration and collaborators.
    ///
    /// Provider implementations come from `hush-llm` and `hush-embeddings`;
    /// [`EngineStores::sqlite`] wires every store to one SQLite database.
    pub fn new(
        config: EngineConfig,
        llm: Arc<dyn Llm>,
        embedder: Arc<dyn Embedder>,
        stores: EngineStores,
        transport: Arc<dyn NotificationTransport>,
    ) -> HushResult<Self> {
        if config.inference.timeout_secs == 0 {
            return Err(HushError::Configuration(
                "inference.timeout_secs must be at least 1".to_string(),
            ));
        }
        if config.delivery.rate_window_secs == 0 {
            return Err(HushError::Configuration(
                "delivery.rate_window_secs must be at least 1".to_string(),
            ));
        }

        let viewers = Arc::new(ViewerRegistry::new());
        let retriever = ContextRetriever::new(
            stores.messages.clone(),
            stores.embeddings.clone(),
            embedder,
            config.retrieval.clone(),
        );
        let learner = Arc::new(Learner::new(
            stores.feedback.clone(),
            stores.preferences.clone(),
            config.learner.clone(),
        ));

        Ok(Self {
            inference: InferenceDecisionMaker::new(llm, config.inference.clone()),
            cache: DecisionCache::new(stores.cache, config.cache.clone()),
            rate_limiter: RateLimiter::new(Duration::from_secs(config.delivery.rate_window_secs)),
            delivery: DeliveryPolicy::new(viewers.clone(), transport),
            messages: stores.messages,
            preferences: stores.preferences,
            decisions: stores.decisions,
            feedback: stores.feedback,
            retriever,
            viewers,
            learner,
            in_flight: Mutex::new(HashSet::new()),
            delivered: Mutex::new(HashSet::new()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn messages(&self) -> &Arc<dyn MessageStore> {
        &self.messages
    }

    pub fn preference_store(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    pub fn viewers(&self) -> &Arc<ViewerRegistry> {
        &self.viewers
    }

    pub fn learner(&self) -> &Arc<Learner> {
        &self.learner
    }

    /// Analyze a conversation for a user on demand.
    ///
    /// Bypasses activity triggers but still consults the cache, heuristics and
    /// fallback. Only a non-participant caller is an error; backend failures
    /// surface as a [`AnalysisOutcome::FallbackHeuristic`] decision.
    pub async fn analyze_conversation_for_notification(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> HushResult<NotificationDecision> {
        let outcome = self
            .analyze(conversation_id, user_id, AnalyzeOptions::default())
            .await?;
        Ok(outcome.into_decision())
    }

    /// Analyze a conversation and report how the decision was reached.
    pub async fn analyze(
        &self,
        conversation_id: &str,
        user_id: &str,
        options: AnalyzeOptions,
    ) -> HushResult<AnalysisOutcome> {
        Ok(self.run(conversation_id, user_id, options).await?.outcome)
    }

    async fn run(
        &self,
        conversation_id: &str,
        user_id: &str,
        options: AnalyzeOptions,
    ) -> HushResult<Analysis> {
        let started = Instant::now();
        let now = Utc::now();

        if !self.messages.is_participant(conversation_id, user_id).await? {
            warn!(
                conversation_id = %conversation_id,
                user_id = %user_id,
                "Analysis requested by non-participant"
            );
            return Err(HushError::permission_denied(user_id, conversation_id));
        }

        let preferences = self.preferences.preferences_or_default(user_id)?;
        let suppressed = |reason: SuppressionReason, why: &str, ids: Vec<String>| {
            let decision = NotificationDecision::from_verdict(
                Verdict::skip(why),
                DecisionSource::Policy,
                user_id,
                conversation_id,
                ids,
                "",
                now,
            );
            debug!(
                conversation_id = %conversation_id,
                user_id = %user_id,
                reason = %reason,
                "Analysis short-circuited"
            );
            AnalysisOutcome::Suppressed { decision, reason }
        };

        if !preferences.enabled {
            return Ok(Analysis {
                outcome: suppressed(
                    SuppressionReason::Disabled,
                    "notifications are disabled",
                    Vec::new(),
                ),
                batch: Vec::new(),
                preferences,
            });
        }

        let batch = self
            .retriever
            .fetch_unread_batch(conversation_id, user_id)
            .await?;
        let Some(latest) = batch.last() else {
            return Ok(Analysis {
                outcome: suppressed(
                    SuppressionReason::NothingUnread,
                    "no unread messages",
                    Vec::new(),
                ),
                batch,
                preferences,
            });
        };
        let message_ids: Vec<String> = batch.iter().map(|m| m.id.clone()).collect();
        let key = cache_key(user_id, conversation_id, &latest.id, preferences.version);

        if !options.regenerate {
            match self
                .cache
                .lookup(&key, conversation_id, self.messages.as_ref(), now)
                .await
            {
                Ok(Some(hit)) => {
                    info!(
                        conversation_id = %conversation_id,
                        user_id = %user_id,
                        source = %hit.decision.source,
                        messages_since_cache = hit.messages_since_cache,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Reused cached decision"
                    );
                    return Ok(Analysis {
                        outcome: AnalysisOutcome::Cached {
                            decision: hit.decision,
                            messages_since_cache: hit.messages_since_cache,
                        },
                        batch,
                        preferences,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(conversation_id = %conversation_id, error = %e, "Cache lookup failed, treating as miss");
                }
            }
        }

        let identity = self
            .messages
            .user_identity(user_id)
            .await?
            .unwrap_or_else(|| UserIdentity::new(user_id, user_id, user_id));
        let profile = self.preferences.get_profile(user_id)?;
        let rules = ClassifierProfile::new(identity.clone(), &preferences, profile.as_ref());

        let build = |verdict: Verdict, source: DecisionSource| {
            NotificationDecision::from_verdict(
                verdict,
                source,
                user_id,
                conversation_id,
                message_ids.clone(),
                key.clone(),
                now,
            )
        };

        let outcome = match classifier::classify(&batch, &rules) {
            Triage::DefinitelyNotify(verdict) | Triage::DefinitelySkip(verdict) => {
                let decision = build(verdict, DecisionSource::Heuristic);
                self.write_cache(&decision);
                AnalysisOutcome::Inferred(decision)
            }
            Triage::NeedsInference
                if !self
                    .rate_limiter
                    .try_acquire(user_id, preferences.max_analyses_per_hour) =>
            {
                let (verdict, source) = rate_limited_verdict(&batch, &rules, &preferences);
                info!(
                    conversation_id = %conversation_id,
                    user_id = %user_id,
                    strategy = %preferences.fallback_strategy,
                    "Inference rate limit reached"
                );
                AnalysisOutcome::FallbackHeuristic(build(verdict, source))
            }
            Triage::NeedsInference => {
                let context = self
                    .retriever
                    .assemble(
                        conversation_id,
                        identity,
                        batch.clone(),
                        preferences.clone(),
                        profile,
                    )
                    .await;
                match self.inference.decide(&context).await {
                    InferenceOutcome::Inferred(verdict) => {
                        let decision = build(verdict, DecisionSource::Inferred);
                        self.write_cache(&decision);
                        AnalysisOutcome::Inferred(decision)
                    }
                    InferenceOutcome::Fallback { verdict, cause } => {
                        debug!(conversation_id = %conversation_id, cause = %cause, "Using fallback verdict");
                        AnalysisOutcome::FallbackHeuristic(build(verdict, DecisionSource::Fallback))
                    }
                }
            }
        };

        self.decisions.append(outcome.decision())?;
        info!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            decision_id = %outcome.decision().decision_id,
            outcome = outcome.kind(),
            source = %outcome.decision().source,
            should_notify = outcome.decision().should_notify,
            priority = %outcome.decision().priority,
            duration_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(Analysis {
            outcome,
            batch,
            preferences,
        })
    }

    fn write_cache(&self, decision: &NotificationDecision) {
        if let Err(e) = self.cache.store(decision, decision.generated_at) {
            warn!(
                conversation_id = %decision.source_conversation_id,
                error = %e,
                "Failed to write decision cache"
            );
        }
    }

    /// Run the pipeline for a trigger from the activity monitor and hand the
    /// decision to delivery.
    ///
    /// Returns `None` when an analysis for the same user and conversation is
    /// already running. A cached decision that already reached the transport
    /// is not delivered again; one produced by an on-demand analysis or held
    /// back by a gate goes through delivery like a fresh one.
    pub async fn process_trigger(
        &self,
        request: &AnalysisRequest,
    ) -> HushResult<Option<DeliveryOutcome>> {
        let key = (request.user_id.clone(), request.conversation_id.clone());
        if !self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone())
        {
            debug!(
                conversation_id = %request.conversation_id,
                user_id = %request.user_id,
                "Analysis already in flight, trigger dropped"
            );
            return Ok(None);
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key,
        };

        let analysis = self
            .run(&request.conversation_id, &request.user_id, AnalyzeOptions::default())
            .await?;

        let outcome = match &analysis.outcome {
            AnalysisOutcome::Cached { decision, .. } if self.was_delivered(&decision.decision_id) => {
                DeliveryOutcome::Suppressed {
                    reason: SuppressionReason::AlreadyDelivered,
                }
            }
            AnalysisOutcome::Suppressed { reason, .. } => {
                DeliveryOutcome::Suppressed { reason: *reason }
            }
            AnalysisOutcome::Cached { decision, .. }
            | AnalysisOutcome::Inferred(decision)
            | AnalysisOutcome::FallbackHeuristic(decision) => {
                let title = notification_title(&analysis.batch, &request.user_id);
                let outcome = self
                    .delivery
                    .deliver(decision, &analysis.preferences, title, Utc::now())
                    .await?;
                if outcome.is_delivered() {
                    self.delivered
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(decision.decision_id.clone());
                }
                outcome
            }
        };

        debug!(
            conversation_id = %request.conversation_id,
            user_id = %request.user_id,
            trigger = ?request.trigger,
            outcome = ?outcome,
            "Trigger processed"
        );
        Ok(Some(outcome))
    }

    fn was_delivered(&self, decision_id: &str) -> bool {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(decision_id)
    }

    /// Record feedback on a decision owned by `user_id`.
    pub fn submit_feedback(
        &self,
        user_id: &str,
        decision_id: &str,
        feedback: Feedback,
    ) -> HushResult<FeedbackRecord> {
        let decision = self
            .decisions
            .get(decision_id)?
            .ok_or_else(|| HushError::decision_not_found(decision_id))?;
        if decision.user_id != user_id {
            return Err(HushError::permission_denied(
                user_id,
                decision.source_conversation_id,
            ));
        }

        let record = FeedbackRecord::new(decision, feedback, Utc::now());
        self.feedback.append(&record)?;
        info!(
            user_id = %user_id,
            decision_id = %decision_id,
            feedback = %feedback,
            "Feedback recorded"
        );
        Ok(record)
    }

    /// Mark a conversation as viewed or not viewed by a user.
    pub fn set_viewing(&self, user_id: &str, conversation_id: &str, viewing: bool) {
        self.viewers.set_viewing(user_id, conversation_id, viewing);
    }

    /// Saved preferences or defaults.
    pub fn get_preferences(&self, user_id: &str) -> HushResult<UserNotificationPreferences> {
        self.preferences.preferences_or_default(user_id)
    }

    /// Validate and save preferences. The stored version is bumped, so cached
    /// decisions for the user no longer match.
    pub fn update_preferences(
        &self,
        preferences: UserNotificationPreferences,
    ) -> HushResult<UserNotificationPreferences> {
        validate_preferences(&preferences)?;
        let mut preferences = preferences;
        preferences.priority_keywords = preferences
            .priority_keywords
            .iter()
            .map(|k| k.trim().to_string())
            .collect();

        let stored = self.preferences.put_preferences(&preferences)?;
        info!(user_id = %stored.user_id, version = stored.version, "Preferences updated");
        Ok(stored)
    }

    /// Learned profile, if the learner has run for the user.
    pub fn get_profile(&self, user_id: &str) -> HushResult<Option<UserNotificationProfile>> {
        self.preferences.get_profile(user_id)
    }

    /// Most recent decisions for a user, newest first.
    pub fn recent_decisions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> HushResult<Vec<NotificationDecision>> {
        self.decisions.list_for_user(user_id, limit)
    }
}

fn validate_preferences(preferences: &UserNotificationPreferences) -> HushResult<()> {
    if preferences.user_id.trim().is_empty() {
        return Err(HushError::validation("user_id must not be empty"));
    }
    if preferences.pause_threshold_seconds == 0 {
        return Err(HushError::validation_with_suggestion(
            "pause_threshold_seconds must be at least 1",
            "The default is 120 seconds",
        ));
    }
    if preferences.message_count_threshold == 0 {
        return Err(HushError::validation_with_suggestion(
            "message_count_threshold must be at least 1",
            "The default is 20 messages",
        ));
    }
    if preferences
        .priority_keywords
        .iter()
        .any(|k| k.trim().is_empty())
    {
        return Err(HushError::validation("priority keywords must not be blank"));
    }
    Ok(())
}

/// Verdict used instead of inference once the rate limit is reached.
fn rate_limited_verdict(
    batch: &[ChatMessage],
    rules: &ClassifierProfile,
    preferences: &UserNotificationPreferences,
) -> (Verdict, DecisionSource) {
    match preferences.fallback_strategy {
        FallbackStrategy::SimpleRules => {
            let mut verdict = classifier::fallback_verdict(batch, rules);
            verdict.reason = format!("{} (rate limit reached)", verdict.reason);
            (verdict, DecisionSource::Fallback)
        }
        FallbackStrategy::NotifyAll => {
            let body = batch
                .iter()
                .rev()
                .find(|m| !m.is_from(&rules.identity.user_id))
                .map(|m| text::excerpt(&m.text, EXCERPT_CHARS))
                .unwrap_or_default();
            (
                Verdict::notify(
                    Priority::Medium,
                    "fallback: rate limit reached, notify-all strategy",
                    body,
                ),
                DecisionSource::Policy,
            )
        }
        FallbackStrategy::SuppressAll => (
            Verdict::skip("fallback: rate limit reached, suppress-all strategy"),
            DecisionSource::Policy,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::LoggingTransport;
    use crate::traits::{GenerationOptions, LlmResponse};
    use crate::types::Message;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLlm {
        calls: AtomicUsize,
        reply: String,
    }

    #[async_trait]
    impl Llm for CountingLlm {
        async fn generate(
            &self,
            _messages: &[Message],
            _options: Option<GenerationOptions>,
        ) -> HushResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: Some(self.reply.clone()),
                usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "counting"
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

    fn setup(reply: &str) -> (NotificationEngine, Arc<SqliteStore>, Arc<CountingLlm>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.add_participant("conv-1", "alice").unwrap();
        store.add_participant("conv-1", "bob").unwrap();
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        });
        let engine = NotificationEngine::new(
            EngineConfig::default(),
            llm.clone(),
            Arc::new(ZeroEmbedder),
            EngineStores::sqlite(store.clone()),
            Arc::new(LoggingTransport),
        )
        .unwrap();
        (engine, store, llm)
    }

    fn say(store: &SqliteStore, id: &str, text: &str) {
        store
            .insert_message(&ChatMessage::new(id, "conv-1", "bob", "Bob", text, Utc::now()))
            .unwrap();
    }

    const NOTIFY: &str = r#"{"should_notify": true, "reason": "plans", "notification_text": "Bob shared the release plan", "priority": "medium"}"#;

    #[tokio::test]
    async fn test_non_participant_is_rejected() {
        let (engine, _, _) = setup(NOTIFY);
        let err = engine
            .analyze_conversation_for_notification("conv-1", "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, HushError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_disabled_and_empty_short_circuit() {
        let (engine, store, llm) = setup(NOTIFY);
        let outcome = engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();
        assert!(matches!(
            outcome,
            AnalysisOutcome::Suppressed { reason: SuppressionReason::NothingUnread, .. }
        ));

        say(&store, "m1", "here is the release plan for next week");
        let mut prefs = UserNotificationPreferences::defaults_for("alice");
        prefs.enabled = false;
        engine.update_preferences(prefs).unwrap();
        let outcome = engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();
        assert!(matches!(
            outcome,
            AnalysisOutcome::Suppressed { reason: SuppressionReason::Disabled, .. }
        ));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inferred_decision_is_cached_and_logged() {
        let (engine, store, llm) = setup(NOTIFY);
        say(&store, "m1", "here is the release plan for next week");

        let first = engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();
        assert!(matches!(first, AnalysisOutcome::Inferred(_)));
        assert_eq!(first.decision().source, DecisionSource::Inferred);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let second = engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();
        assert!(second.is_cached());
        assert_eq!(second.decision(), first.decision());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let regenerated = engine
            .analyze("conv-1", "alice", AnalyzeOptions { regenerate: true })
            .await
            .unwrap();
        assert!(!regenerated.is_cached());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);

        assert_eq!(engine.recent_decisions("alice", 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_preference_update_invalidates_cache() {
        let (engine, store, llm) = setup(NOTIFY);
        say(&store, "m1", "here is the release plan for next week");
        engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();

        engine
            .update_preferences(UserNotificationPreferences::defaults_for("alice"))
            .unwrap();
        let outcome = engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();
        assert!(!outcome.is_cached());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_uses_fallback_strategy() {
        let (engine, store, llm) = setup(NOTIFY);
        engine
            .update_preferences(
                UserNotificationPreferences::defaults_for("alice")
                    .with_max_analyses_per_hour(0)
                    .with_fallback_strategy(FallbackStrategy::NotifyAll),
            )
            .unwrap();
        say(&store, "m1", "here is the release plan for next week");

        let outcome = engine.analyze("conv-1", "alice", AnalyzeOptions::default()).await.unwrap();
        let AnalysisOutcome::FallbackHeuristic(decision) = outcome else {
            panic!("expected fallback outcome");
        };
        assert!(decision.should_notify);
        assert_eq!(decision.source, DecisionSource::Policy);
        assert!(decision.reason.starts_with("fallback: "));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_feedback_ownership() {
        let (engine, store, _) = setup(NOTIFY);
        say(&store, "m1", "here is the release plan for next week");
        let decision = engine
            .analyze_conversation_for_notification("conv-1", "alice")
            .await
            .unwrap();

        let record = engine
            .submit_feedback("alice", &decision.decision_id, Feedback::Helpful)
            .unwrap();
        assert!(record.is_helpful());

        let err = engine
            .submit_feedback("bob", &decision.decision_id, Feedback::Helpful)
            .unwrap_err();
        assert!(matches!(err, HushError::PermissionDenied { .. }));

        let err = engine
            .submit_feedback("alice", "missing", Feedback::Helpful)
            .unwrap_err();
        assert!(matches!(err, HushError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_trigger_delivery_and_cached_redelivery() {
        let (engine, store, _) = setup(NOTIFY);
        say(&store, "m1", "here is the release plan for next week");
        let request = AnalysisRequest {
            user_id: "alice".to_string(),
            conversation_id: "conv-1".to_string(),
            trigger: crate::activity::Trigger::Pause,
            requested_at: Utc::now(),
        };

        let first = engine.process_trigger(&request).await.unwrap().unwrap();
        assert!(first.is_delivered());

        let second = engine.process_trigger(&request).await.unwrap().unwrap();
        assert_eq!(
            second,
            DeliveryOutcome::Suppressed { reason: SuppressionReason::AlreadyDelivered }
        );
    }

    #[tokio::test]
    async fn test_trigger_delivers_decision_cached_on_demand() {
        let (engine, store, llm) = setup(NOTIFY);
        say(&store, "m1", "here is the release plan for next week");
        let decision = engine
            .analyze_conversation_for_notification("conv-1", "alice")
            .await
            .unwrap();
        assert!(decision.should_notify);

        let request = AnalysisRequest {
            user_id: "alice".to_string(),
            conversation_id: "conv-1".to_string(),
            trigger: crate::activity::Trigger::Pause,
            requested_at: Utc::now(),
        };
        let outcome = engine.process_trigger(&request).await.unwrap().unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let again = engine.process_trigger(&request).await.unwrap().unwrap();
        assert_eq!(
            again,
            DeliveryOutcome::Suppressed { reason: SuppressionReason::AlreadyDelivered }
        );
    }

    #[test]
    fn test_preference_validation() {
        let mut prefs = UserNotificationPreferences::defaults_for("alice");
        assert!(validate_preferences(&prefs).is_ok());
        prefs.pause_threshold_seconds = 0;
        assert!(validate_preferences(&prefs).is_err());

        let prefs = UserNotificationPreferences::defaults_for("alice").with_keywords(["  "]);
        assert!(validate_preferences(&prefs).is_err());
    }
}
