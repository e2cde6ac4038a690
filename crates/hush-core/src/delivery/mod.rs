//! Post-decision delivery gates.
//!
//! Gates run in order: not-notifiable, active viewer, quiet hours (high
//! priority bypasses), then priority is mapped to a presentation and the
//! notification is handed to the transport. Rate limiting happens before
//! inference and lives in [`RateLimiter`].

mod rate_limit;
mod transport;
mod viewers;

pub use rate_limit::RateLimiter;
pub use transport::{
    verify_signature, LoggingTransport, RetryPolicy, WebhookTransport, WebhookTransportConfig,
};
pub use viewers::ViewerRegistry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::HushResult;
use crate::traits::{NotificationTransport, OutboundNotification};
use crate::types::{
    ChatMessage, DeliveryOutcome, NotificationDecision, Presentation, Priority,
    SuppressionReason, UserNotificationPreferences,
};

/// Delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Length of the inference rate-limit window.
    pub rate_window_secs: u64,
    /// Webhook transport; notifications are only logged when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookTransportConfig>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: 3600,
            webhook: None,
        }
    }
}

impl DeliveryConfig {
    /// Transport selected by this configuration.
    pub fn build_transport(&self) -> HushResult<Arc<dyn NotificationTransport>> {
        Ok(match &self.webhook {
            Some(webhook) => Arc::new(WebhookTransport::new(webhook.clone())?),
            None => Arc::new(LoggingTransport),
        })
    }
}

/// Notification title from the senders of a batch: "Bob", "Bob and Carol",
/// "Bob, Carol and 2 others".
pub fn notification_title(batch: &[ChatMessage], reader_id: &str) -> String {
    let mut senders: Vec<&str> = Vec::new();
    for message in batch.iter().filter(|m| !m.is_from(reader_id)) {
        if !senders.contains(&message.sender_name.as_str()) {
            senders.push(&message.sender_name);
        }
    }

    match senders.as_slice() {
        [] => "New messages".to_string(),
        [one] => one.to_string(),
        [a, b] => format!("{} and {}", a, b),
        [a, b, rest @ ..] => format!("{}, {} and {} others", a, b, rest.len()),
    }
}

/// Applies the delivery gates and hands notifications to the transport.
pub struct DeliveryPolicy {
    viewers: Arc<ViewerRegistry>,
    transport: Arc<dyn NotificationTransport>,
}

impl DeliveryPolicy {
    pub fn new(viewers: Arc<ViewerRegistry>, transport: Arc<dyn NotificationTransport>) -> Self {
        Self { viewers, transport }
    }

    /// Gate outcome without delivering.
    pub fn evaluate(
        &self,
        decision: &NotificationDecision,
        preferences: &UserNotificationPreferences,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        if !decision.should_notify {
            return DeliveryOutcome::Suppressed {
                reason: SuppressionReason::NotNotifiable,
            };
        }
        if self
            .viewers
            .is_viewing(&decision.user_id, &decision.source_conversation_id)
        {
            return DeliveryOutcome::Suppressed {
                reason: SuppressionReason::ActiveViewer,
            };
        }
        if decision.priority != Priority::High && preferences.in_quiet_hours(now) {
            return DeliveryOutcome::Suppressed {
                reason: SuppressionReason::QuietHours,
            };
        }
        DeliveryOutcome::Delivered {
            presentation: Presentation::from(decision.priority),
        }
    }

    /// Apply the gates and deliver when they pass.
    pub async fn deliver(
        &self,
        decision: &NotificationDecision,
        preferences: &UserNotificationPreferences,
        title: String,
        now: DateTime<Utc>,
    ) -> HushResult<DeliveryOutcome> {
        let outcome = self.evaluate(decision, preferences, now);

        let DeliveryOutcome::Delivered { presentation } = outcome else {
            debug!(
                user_id = %decision.user_id,
                conversation_id = %decision.source_conversation_id,
                decision_id = %decision.decision_id,
                outcome = ?outcome,
                "Notification suppressed"
            );
            return Ok(outcome);
        };

        let notification = OutboundNotification {
            user_id: decision.user_id.clone(),
            title,
            body: decision.notification_text.clone().unwrap_or_default(),
            priority: decision.priority,
            presentation,
            deep_link_conversation_id: decision.source_conversation_id.clone(),
            deep_link_message_id: decision.latest_message_id().map(str::to_string),
            decision_id: decision.decision_id.clone(),
        };
        self.transport.deliver(&notification).await?;

        info!(
            user_id = %decision.user_id,
            conversation_id = %decision.source_conversation_id,
            decision_id = %decision.decision_id,
            presentation = %presentation,
            "Notification handed to transport"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionSource, QuietHours, Verdict};
    use chrono::{NaiveTime, TimeZone};

    fn decision(priority: Priority) -> NotificationDecision {
        NotificationDecision::from_verdict(
            Verdict::notify(priority, "test", "body"),
            DecisionSource::Heuristic,
            "alice",
            "conv-1",
            vec!["m1".to_string()],
            "key",
            Utc::now(),
        )
    }

    fn policy() -> (DeliveryPolicy, Arc<ViewerRegistry>) {
        let viewers = Arc::new(ViewerRegistry::new());
        (
            DeliveryPolicy::new(viewers.clone(), Arc::new(LoggingTransport)),
            viewers,
        )
    }

    fn night_prefs() -> UserNotificationPreferences {
        UserNotificationPreferences::defaults_for("alice").with_quiet_hours(QuietHours::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_gate_order() {
        let (policy, viewers) = policy();
        let night = Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let prefs = night_prefs();

        let skip = NotificationDecision::from_verdict(
            Verdict::skip("chatter"),
            DecisionSource::Heuristic,
            "alice",
            "conv-1",
            vec![],
            "key",
            Utc::now(),
        );
        assert_eq!(
            policy.evaluate(&skip, &prefs, day),
            DeliveryOutcome::Suppressed { reason: SuppressionReason::NotNotifiable }
        );

        assert_eq!(
            policy.evaluate(&decision(Priority::Medium), &prefs, night),
            DeliveryOutcome::Suppressed { reason: SuppressionReason::QuietHours }
        );
        assert_eq!(
            policy.evaluate(&decision(Priority::High), &prefs, night),
            DeliveryOutcome::Delivered { presentation: Presentation::Alert }
        );
        assert_eq!(
            policy.evaluate(&decision(Priority::Low), &prefs, day),
            DeliveryOutcome::Delivered { presentation: Presentation::CounterOnly }
        );

        viewers.set_viewing("alice", "conv-1", true);
        assert_eq!(
            policy.evaluate(&decision(Priority::High), &prefs, day),
            DeliveryOutcome::Suppressed { reason: SuppressionReason::ActiveViewer }
        );
    }

    #[test]
    fn test_notification_title() {
        let m = |sender: &str| ChatMessage::new("m", "c", sender.to_lowercase(), sender, "hi", Utc::now());
        assert_eq!(notification_title(&[], "alice"), "New messages");
        assert_eq!(notification_title(&[m("Bob"), m("Bob")], "alice"), "Bob");
        assert_eq!(notification_title(&[m("Bob"), m("Carol")], "alice"), "Bob and Carol");
        assert_eq!(
            notification_title(&[m("Bob"), m("Carol"), m("Dan"), m("Eve"), m("Alice")], "alice"),
            "Bob, Carol and 2 others"
        );
    }

    #[test]
    fn test_default_transport_is_logging() {
        assert!(DeliveryConfig::default().build_transport().is_ok());
    }
}
