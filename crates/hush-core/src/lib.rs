//! hush-core - Core library for hush.
//!
//! This crate provides the types, traits and pipeline that decide whether
//! unread conversation activity deserves a push notification: activity
//! monitoring, rule-based triage, context retrieval, inference with
//! deterministic fallback, the decision cache, delivery gates and the
//! feedback-driven profile learner.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hush_core::{EngineConfig, EngineStores, LoggingTransport, NotificationEngine, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::new("hush.db")?);
//! let engine = NotificationEngine::new(
//!     EngineConfig::default(),
//!     llm,
//!     embedder,
//!     EngineStores::sqlite(store),
//!     Arc::new(LoggingTransport),
//! )?;
//!
//! let decision = engine
//!     .analyze_conversation_for_notification("conv-1", "alice")
//!     .await?;
//! ```

pub mod activity;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod inference;
pub mod learner;
pub mod retrieval;
pub mod runtime;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use activity::{ActivityConfig, ActivityMonitor, AnalysisRequest, Trigger};
pub use cache::{CacheConfig, DecisionCache, DecisionCacheStore};
pub use config::{EmbedderProviderConfig, EngineConfig, LlmProvider, LlmProviderConfig};
pub use delivery::{
    DeliveryConfig, DeliveryPolicy, LoggingTransport, RateLimiter, ViewerRegistry,
    WebhookTransport, WebhookTransportConfig,
};
pub use engine::{AnalyzeOptions, EngineStores, NotificationEngine};
pub use error::{HushError, HushResult};
pub use inference::{InferenceConfig, InferenceDecisionMaker, InferenceOutcome};
pub use learner::{Learner, LearnerConfig, LearnerRunSummary, LearnerScheduler};
pub use retrieval::{ContextRetriever, NotificationContext, RetrievalConfig};
pub use runtime::{BackgroundRuntime, RuntimeConfig};
pub use store::SqliteStore;
pub use traits::{
    DecisionLog, Embedder, EmbedderConfig, EmbedderProvider, EmbeddingStore, FeedbackStore, Llm,
    LlmConfig, MessageStore, NotificationTransport, OutboundNotification, PreferenceStore,
};
pub use types::{
    AnalysisOutcome, ChatMessage, DecisionSource, DeliveryOutcome, FallbackStrategy, Feedback,
    FeedbackRecord, Message, MessageRole, NotificationDecision, NotificationRate, Presentation,
    Priority, QuietHours, SuppressionReason, UserIdentity, UserNotificationPreferences,
    UserNotificationProfile, Verdict,
};
