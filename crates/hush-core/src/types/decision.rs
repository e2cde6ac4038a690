//! Notification decisions and analysis outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Notification priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Priority {
    High,
    Medium,
    #[default]
    Low,
}

/// Which stage of the pipeline produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionSource {
    /// Resolved by the rule-based classifier without inference.
    Heuristic,
    /// Produced by the inference backend.
    Inferred,
    /// Deterministic rules used because inference was unavailable or invalid.
    Fallback,
    /// Produced by a user policy (disabled notifications, rate-limit strategy).
    Policy,
}

/// The bare verdict of a classifier, model or policy, before bookkeeping is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub should_notify: bool,
    pub reason: String,
    pub notification_text: Option<String>,
    pub priority: Priority,
}

impl Verdict {
    /// A verdict to notify.
    pub fn notify(
        priority: Priority,
        reason: impl Into<String>,
        notification_text: impl Into<String>,
    ) -> Self {
        Self {
            should_notify: true,
            reason: reason.into(),
            notification_text: Some(notification_text.into()),
            priority,
        }
    }

    /// A verdict not to notify.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_notify: false,
            reason: reason.into(),
            notification_text: None,
            priority: Priority::Low,
        }
    }

    /// Prefix the reason, e.g. to mark a fallback-sourced verdict.
    pub fn with_reason_prefix(mut self, prefix: &str) -> Self {
        self.reason = format!("{}{}", prefix, self.reason);
        self
    }
}

/// Output of a single analysis run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDecision {
    pub decision_id: String,
    pub user_id: String,
    pub should_notify: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_text: Option<String>,
    pub priority: Priority,
    pub source: DecisionSource,
    pub source_conversation_id: String,
    pub source_message_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub cache_key: String,
}

impl NotificationDecision {
    /// Build a decision from a verdict.
    ///
    /// A decision that does not notify never carries notification text, and an
    /// empty text is treated as absent.
    pub fn from_verdict(
        verdict: Verdict,
        source: DecisionSource,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        source_message_ids: Vec<String>,
        cache_key: impl Into<String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let notification_text = if verdict.should_notify {
            verdict
                .notification_text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        } else {
            None
        };

        Self {
            decision_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            should_notify: verdict.should_notify,
            reason: verdict.reason,
            notification_text,
            priority: verdict.priority,
            source,
            source_conversation_id: conversation_id.into(),
            source_message_ids,
            generated_at,
            cache_key: cache_key.into(),
        }
    }

    /// Check the decision invariants. Used to reject corrupted stored copies.
    pub fn is_consistent(&self) -> bool {
        if self.decision_id.is_empty() || self.source_conversation_id.is_empty() {
            return false;
        }
        self.should_notify
            || self
                .notification_text
                .as_deref()
                .map_or(true, |t| t.is_empty())
    }

    /// Id of the newest message the decision covers.
    pub fn latest_message_id(&self) -> Option<&str> {
        self.source_message_ids.last().map(String::as_str)
    }
}

/// How a notification is presented on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Presentation {
    /// Interruptive alert with sound.
    Alert,
    /// Silent entry in the notification list.
    Silent,
    /// Badge counter only, no alert.
    CounterOnly,
}

impl From<Priority> for Presentation {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::High => Presentation::Alert,
            Priority::Medium => Presentation::Silent,
            Priority::Low => Presentation::CounterOnly,
        }
    }
}

impl Presentation {
    /// Whether the device should play a sound.
    pub fn plays_sound(&self) -> bool {
        matches!(self, Presentation::Alert)
    }
}

/// Why a decision was not delivered or not computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuppressionReason {
    /// The user is looking at the conversation.
    ActiveViewer,
    /// Inside the user's quiet hours and not high priority.
    QuietHours,
    /// The decision says not to notify.
    NotNotifiable,
    /// The user disabled notification analysis.
    Disabled,
    /// No unread messages to analyze.
    NothingUnread,
    /// The decision was reused from the cache and has already been handled.
    AlreadyDelivered,
}

/// Result of an analysis run, so callers can branch without inspecting errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// A fresh cache entry was reused.
    Cached {
        decision: NotificationDecision,
        messages_since_cache: usize,
    },
    /// Produced by the rule-based classifier or the inference backend.
    Inferred(NotificationDecision),
    /// Produced by deterministic fallback rules.
    FallbackHeuristic(NotificationDecision),
    /// Analysis short-circuited by policy.
    Suppressed {
        decision: NotificationDecision,
        reason: SuppressionReason,
    },
}

impl AnalysisOutcome {
    /// The decision carried by this outcome.
    pub fn decision(&self) -> &NotificationDecision {
        match self {
            AnalysisOutcome::Cached { decision, .. } => decision,
            AnalysisOutcome::Inferred(decision) => decision,
            AnalysisOutcome::FallbackHeuristic(decision) => decision,
            AnalysisOutcome::Suppressed { decision, .. } => decision,
        }
    }

    /// Consume the outcome, returning its decision.
    pub fn into_decision(self) -> NotificationDecision {
        match self {
            AnalysisOutcome::Cached { decision, .. } => decision,
            AnalysisOutcome::Inferred(decision) => decision,
            AnalysisOutcome::FallbackHeuristic(decision) => decision,
            AnalysisOutcome::Suppressed { decision, .. } => decision,
        }
    }

    /// Whether the decision came from the cache.
    pub fn is_cached(&self) -> bool {
        matches!(self, AnalysisOutcome::Cached { .. })
    }

    /// Outcome name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisOutcome::Cached { .. } => "cached",
            AnalysisOutcome::Inferred(_) => "inferred",
            AnalysisOutcome::FallbackHeuristic(_) => "fallback_heuristic",
            AnalysisOutcome::Suppressed { .. } => "suppressed",
        }
    }
}

/// What the delivery policy did with a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { presentation: Presentation },
    Suppressed { reason: SuppressionReason },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}
