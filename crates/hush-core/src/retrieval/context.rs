//! The bounded input handed to inference.

use serde::Serialize;

use crate::classifier::ClassifierProfile;
use crate::types::{ChatMessage, UserIdentity, UserNotificationPreferences, UserNotificationProfile};

/// A historical message judged relevant to the unread batch.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedMessage {
    pub message: ChatMessage,
    pub score: f32,
}

/// Everything inference needs to decide for one (reader, conversation) pair.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationContext {
    pub conversation_id: String,
    pub identity: UserIdentity,
    /// Unread messages of the triggering conversation, oldest first.
    pub unread: Vec<ChatMessage>,
    /// The reader's own recent messages across conversations, newest first.
    pub recent_activity: Vec<ChatMessage>,
    /// Semantically related history, most similar first.
    pub related_history: Vec<RelatedMessage>,
    pub preferences: UserNotificationPreferences,
    pub profile: Option<UserNotificationProfile>,
    /// Set when retrieval failed and only the unread batch and preferences are present.
    pub degraded: bool,
}

impl NotificationContext {
    /// Context without behavioural or semantic enrichment.
    pub fn minimal(
        conversation_id: impl Into<String>,
        identity: UserIdentity,
        unread: Vec<ChatMessage>,
        preferences: UserNotificationPreferences,
        profile: Option<UserNotificationProfile>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            identity,
            unread,
            recent_activity: Vec::new(),
            related_history: Vec::new(),
            preferences,
            profile,
            degraded: false,
        }
    }

    pub fn classifier_profile(&self) -> ClassifierProfile {
        ClassifierProfile::new(
            self.identity.clone(),
            &self.preferences,
            self.profile.as_ref(),
        )
    }
}
