//! Context retrieval for inference.
//!
//! Combines the unread batch with the reader's recent cross-conversation
//! activity and semantically related history. Retrieval never fails the
//! pipeline: on any error or timeout the context degrades to the unread batch
//! plus preferences.

mod context;
mod similarity;

pub use context::{NotificationContext, RelatedMessage};
pub use similarity::{cosine_similarity, merge_hits};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HushError, HushResult};
use crate::traits::{Embedder, EmbeddingStore, MessageStore};
use crate::types::{
    ChatMessage, MessageEmbedding, UserIdentity, UserNotificationPreferences,
    UserNotificationProfile,
};

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum unread messages fetched from the triggering conversation.
    pub unread_limit: usize,
    /// Only unread messages this close to the newest one are kept.
    pub unread_window_mins: i64,
    /// Maximum messages of the reader's own activity.
    pub activity_limit: usize,
    /// How far back the reader's own activity is read.
    pub activity_days: u32,
    /// Related historical messages returned.
    pub top_k: usize,
    /// Stored embeddings younger than this are reused.
    pub embedding_reuse_days: i64,
    /// Deadline for the whole enrichment step.
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            unread_limit: 30,
            unread_window_mins: 15,
            activity_limit: 100,
            activity_days: 7,
            top_k: 10,
            embedding_reuse_days: 7,
            timeout_secs: 3,
        }
    }
}

/// Builds [`NotificationContext`]s.
pub struct ContextRetriever {
    messages: Arc<dyn MessageStore>,
    embeddings: Arc<dyn EmbeddingStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

struct Enrichment {
    recent_activity: Vec<ChatMessage>,
    related_history: Vec<RelatedMessage>,
}

impl ContextRetriever {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        embeddings: Arc<dyn EmbeddingStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            messages,
            embeddings,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Unread messages of a conversation, restricted to the recent window
    /// ending at the newest unread message. Oldest first.
    pub async fn fetch_unread_batch(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> HushResult<Vec<ChatMessage>> {
        let mut unread = self
            .messages
            .fetch_unread_messages(conversation_id, user_id, self.config.unread_limit)
            .await?;
        unread.sort_by_key(|m| m.created_at);

        if let Some(newest) = unread.last().map(|m| m.created_at) {
            let cutoff = newest - ChronoDuration::minutes(self.config.unread_window_mins);
            unread.retain(|m| m.created_at >= cutoff);
        }
        Ok(unread)
    }

    /// Assemble the inference context for an unread batch.
    pub async fn assemble(
        &self,
        conversation_id: &str,
        identity: UserIdentity,
        unread: Vec<ChatMessage>,
        preferences: UserNotificationPreferences,
        profile: Option<UserNotificationProfile>,
    ) -> NotificationContext {
        let mut context =
            NotificationContext::minimal(conversation_id, identity, unread, preferences, profile);
        let started = Instant::now();
        let deadline = Duration::from_secs(self.config.timeout_secs);

        let result = match tokio::time::timeout(deadline, self.enrich(&context)).await {
            Ok(result) => result,
            Err(_) => Err(HushError::timeout("context retrieval", deadline)),
        };

        match result {
            Ok(enrichment) => {
                debug!(
                    conversation_id = %context.conversation_id,
                    user_id = %context.identity.user_id,
                    recent_activity = enrichment.recent_activity.len(),
                    related = enrichment.related_history.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Context assembled"
                );
                context.recent_activity = enrichment.recent_activity;
                context.related_history = enrichment.related_history;
            }
            Err(e) => {
                warn!(
                    conversation_id = %context.conversation_id,
                    user_id = %context.identity.user_id,
                    error = %e,
                    "Context retrieval degraded to unread batch and preferences"
                );
                context.degraded = true;
            }
        }
        context
    }

    async fn enrich(&self, context: &NotificationContext) -> HushResult<Enrichment> {
        let user_id = context.identity.user_id.as_str();

        let activity = self.messages.fetch_recent_user_activity(
            user_id,
            self.config.activity_days,
            self.config.activity_limit,
        );
        let related = async {
            if context.unread.is_empty() || self.config.top_k == 0 {
                Ok(Vec::new())
            } else {
                self.related_history(user_id, &context.unread).await
            }
        };
        let (recent_activity, related_history) = futures::try_join!(activity, related)?;

        Ok(Enrichment {
            recent_activity,
            related_history,
        })
    }

    async fn related_history(
        &self,
        user_id: &str,
        unread: &[ChatMessage],
    ) -> HushResult<Vec<RelatedMessage>> {
        let vectors = self.batch_embeddings(unread).await?;
        let scope = self.messages.user_conversation_ids(user_id).await?;
        let exclude: Vec<String> = unread.iter().map(|m| m.id.clone()).collect();

        let searches = vectors.iter().map(|vector| {
            self.embeddings
                .similarity_search(vector, &scope, self.config.top_k, &exclude)
        });
        let hits = try_join_all(searches).await?.into_iter().flatten().collect();
        let ranked = merge_hits(hits, self.config.top_k);

        let ids: Vec<String> = ranked.iter().map(|h| h.message_id.clone()).collect();
        let mut fetched = self.messages.fetch_messages(&ids).await?;

        Ok(ranked
            .into_iter()
            .filter_map(|hit| {
                let pos = fetched.iter().position(|m| m.id == hit.message_id)?;
                Some(RelatedMessage {
                    message: fetched.swap_remove(pos),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// One vector per unread message. Stored embeddings are reused while
    /// fresh; missing ones are generated and stored. Stored embeddings are
    /// never replaced.
    async fn batch_embeddings(&self, unread: &[ChatMessage]) -> HushResult<Vec<Vec<f32>>> {
        let now = Utc::now();
        let max_age = ChronoDuration::days(self.config.embedding_reuse_days);

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(unread.len());
        let mut missing = Vec::new();
        let mut absent = Vec::new();

        for (i, message) in unread.iter().enumerate() {
            match self.embeddings.get_embedding(&message.id).await? {
                Some(stored) if now - stored.created_at < max_age => vectors.push(Some(stored.vector)),
                Some(_) => {
                    vectors.push(None);
                    missing.push(i);
                }
                None => {
                    vectors.push(None);
                    missing.push(i);
                    absent.push(i);
                }
            }
        }

        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| unread[i].text.clone()).collect();
            let generated = self.embedder.embed_batch(&texts).await?;
            if generated.len() != texts.len() {
                return Err(HushError::embedding(format!(
                    "Embedder returned {} vectors for {} texts",
                    generated.len(),
                    texts.len()
                )));
            }

            for (&i, vector) in missing.iter().zip(generated) {
                if absent.contains(&i) {
                    let message = &unread[i];
                    self.embeddings
                        .put_embedding(MessageEmbedding {
                            message_id: message.id.clone(),
                            conversation_id: message.conversation_id.clone(),
                            vector: vector.clone(),
                            model: self.embedder.model_name().to_string(),
                            created_at: now,
                        })
                        .await?;
                }
                vectors[i] = Some(vector);
            }
        }

        Ok(vectors.into_iter().flatten().collect())
    }
}
