//! Storage collaborator traits.
//!
//! The message and embedding stores may live outside this process, so their
//! traits are async. Preference, decision and feedback documents are owned by
//! hush and accessed through synchronous traits, like the SQLite-backed
//! reference implementation in [`crate::store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::HushResult;
use crate::types::{
    ChatMessage, FeedbackRecord, MessageEmbedding, NotificationDecision, SimilarMessage,
    UserIdentity, UserNotificationPreferences, UserNotificationProfile,
};

/// Read access to conversations and messages. hush never writes messages
/// through this trait; ingestion helpers live on the concrete store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Unread messages in a conversation for a user, oldest first, at most `limit`.
    /// Messages authored by the user are never unread.
    async fn fetch_unread_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> HushResult<Vec<ChatMessage>>;

    /// Messages the user sent across all conversations in the past `since_days`,
    /// newest first, at most `limit`.
    async fn fetch_recent_user_activity(
        &self,
        user_id: &str,
        since_days: u32,
        limit: usize,
    ) -> HushResult<Vec<ChatMessage>>;

    /// Fetch messages by id. Unknown ids are skipped.
    async fn fetch_messages(&self, message_ids: &[String]) -> HushResult<Vec<ChatMessage>>;

    /// Conversations the user participates in.
    async fn user_conversation_ids(&self, user_id: &str) -> HushResult<Vec<String>>;

    /// User ids participating in a conversation.
    async fn participants(&self, conversation_id: &str) -> HushResult<Vec<String>>;

    /// Whether the user participates in the conversation.
    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> HushResult<bool>;

    /// Identity used for mention and name matching.
    async fn user_identity(&self, user_id: &str) -> HushResult<Option<UserIdentity>>;

    /// Number of messages created in the conversation after `since`.
    async fn count_messages_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> HushResult<usize>;
}

/// Persistence and similarity search for message embeddings.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Get a stored embedding.
    async fn get_embedding(&self, message_id: &str) -> HushResult<Option<MessageEmbedding>>;

    /// Store an embedding. An existing embedding for the same message is kept.
    async fn put_embedding(&self, embedding: MessageEmbedding) -> HushResult<()>;

    /// Top-k most similar stored messages within the given conversations.
    async fn similarity_search(
        &self,
        vector: &[f32],
        scope_conversation_ids: &[String],
        top_k: usize,
        exclude_message_ids: &[String],
    ) -> HushResult<Vec<SimilarMessage>>;
}

/// Preferences and learned profiles, keyed by user id.
pub trait PreferenceStore: Send + Sync {
    /// Get saved preferences.
    fn get_preferences(&self, user_id: &str) -> HushResult<Option<UserNotificationPreferences>>;

    /// Save preferences, bumping their version. Returns the stored copy.
    fn put_preferences(
        &self,
        preferences: &UserNotificationPreferences,
    ) -> HushResult<UserNotificationPreferences>;

    /// Get the learned profile.
    fn get_profile(&self, user_id: &str) -> HushResult<Option<UserNotificationProfile>>;

    /// Replace the learned profile.
    fn put_profile(&self, profile: &UserNotificationProfile) -> HushResult<()>;

    /// Saved preferences or defaults.
    fn preferences_or_default(&self, user_id: &str) -> HushResult<UserNotificationPreferences> {
        Ok(self
            .get_preferences(user_id)?
            .unwrap_or_else(|| UserNotificationPreferences::defaults_for(user_id)))
    }
}

/// Immutable audit log of produced decisions.
pub trait DecisionLog: Send + Sync {
    /// Append a decision. Appending the same decision id twice is a no-op.
    fn append(&self, decision: &NotificationDecision) -> HushResult<()>;

    /// Get a decision by id.
    fn get(&self, decision_id: &str) -> HushResult<Option<NotificationDecision>>;

    /// Most recent decisions for a user, newest first.
    fn list_for_user(&self, user_id: &str, limit: usize) -> HushResult<Vec<NotificationDecision>>;
}

/// Append-only feedback history.
pub trait FeedbackStore: Send + Sync {
    /// Append a feedback record.
    fn append(&self, record: &FeedbackRecord) -> HushResult<()>;

    /// All feedback for a user, oldest first.
    fn list_for_user(&self, user_id: &str) -> HushResult<Vec<FeedbackRecord>>;

    /// Users that have submitted any feedback.
    fn users_with_feedback(&self) -> HushResult<Vec<String>>;
}
