//! Notification transport trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HushResult;
use crate::types::{Presentation, Priority};

/// Payload handed to the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub presentation: Presentation,
    pub deep_link_conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_link_message_id: Option<String>,
    pub decision_id: String,
}

/// Delivers a payload to a user's devices. Delivery guarantees belong to the
/// implementation.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, notification: &OutboundNotification) -> HushResult<()>;
}
