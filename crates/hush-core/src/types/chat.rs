//! Conversation messages and participant identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in a conversation, as provided by the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// User ids explicitly mentioned by the client (structured mentions).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl ChatMessage {
    /// Create a message with no structured mentions.
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            text: text.into(),
            created_at,
            mentions: Vec::new(),
        }
    }

    /// Attach structured mentions.
    pub fn with_mentions(mut self, mentions: Vec<String>) -> Self {
        self.mentions = mentions;
        self
    }

    /// Whether this message was written by the given user.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

/// How a user can be addressed in conversation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    /// Handle used for `@handle` mentions.
    pub handle: String,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(
        user_id: impl Into<String>,
        handle: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            handle: handle.into(),
            display_name: display_name.into(),
        }
    }

    /// Names the user may be addressed by: the full display name and its first token.
    pub fn addressable_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let full = self.display_name.trim();
        if !full.is_empty() {
            names.push(full.to_string());
            if let Some(first) = full.split_whitespace().next() {
                if first != full && first.chars().count() >= 2 {
                    names.push(first.to_string());
                }
            }
        }
        names
    }
}

/// Vector embedding of a message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEmbedding {
    pub message_id: String,
    pub conversation_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// A similarity hit from the embedding store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMessage {
    pub message_id: String,
    pub score: f32,
}
