//! Server state management.

use std::sync::Arc;

use chrono::Utc;
use hush_core::error::HushResult;
use hush_core::store::SqliteStore;
use hush_core::types::ChatMessage;
use hush_core::{BackgroundRuntime, NotificationEngine};
use tokio::sync::RwLock;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<NotificationEngine>,
    pub store: Arc<SqliteStore>,
    runtime: Arc<RwLock<Option<BackgroundRuntime>>>,
}

impl AppState {
    /// Create state without background tasks. Messages are stored but only
    /// on-demand analysis runs.
    pub fn new(engine: Arc<NotificationEngine>, store: Arc<SqliteStore>) -> Self {
        Self {
            engine,
            store,
            runtime: Arc::new(RwLock::new(None)),
        }
    }

    /// Create state driven by a running [`BackgroundRuntime`].
    pub fn new_with_runtime(runtime: BackgroundRuntime, store: Arc<SqliteStore>) -> Self {
        Self {
            engine: runtime.engine().clone(),
            store,
            runtime: Arc::new(RwLock::new(Some(runtime))),
        }
    }

    /// Whether activity monitoring and the learner are running.
    pub async fn has_runtime(&self) -> bool {
        self.runtime.read().await.is_some()
    }

    /// Users with tracked activity, when the monitor runs.
    pub async fn tracked_users(&self) -> Option<usize> {
        self.runtime
            .read()
            .await
            .as_ref()
            .and_then(BackgroundRuntime::tracked_users)
    }

    /// Detach the runtime for shutdown.
    pub async fn take_runtime(&self) -> Option<BackgroundRuntime> {
        self.runtime.write().await.take()
    }

    /// Store a message and report it to the activity monitor. Participants
    /// who have the conversation open have read it.
    ///
    /// Returns false for a duplicate message id.
    pub async fn post_message(&self, message: &ChatMessage) -> HushResult<bool> {
        if !self.store.insert_message(message)? {
            return Ok(false);
        }
        let conversation_id = &message.conversation_id;
        for user_id in self.engine.messages().participants(conversation_id).await? {
            if self.engine.viewers().is_viewing(&user_id, conversation_id) {
                self.store
                    .mark_read(conversation_id, &user_id, message.created_at)?;
            }
        }
        if let Some(runtime) = self.runtime.read().await.as_ref() {
            runtime.message_posted(message).await?;
        }
        Ok(true)
    }

    /// Update viewer state. Opening or leaving a conversation marks it read.
    pub async fn set_viewing(
        &self,
        user_id: &str,
        conversation_id: &str,
        viewing: bool,
    ) -> HushResult<()> {
        match self.runtime.read().await.as_ref() {
            Some(runtime) => runtime.set_viewing(user_id, conversation_id, viewing)?,
            None => self.engine.set_viewing(user_id, conversation_id, viewing),
        }
        self.store.mark_read(conversation_id, user_id, Utc::now())?;
        Ok(())
    }

    /// Tell the activity monitor to reload a user's thresholds.
    pub async fn preferences_changed(&self, user_id: &str) -> HushResult<()> {
        if let Some(runtime) = self.runtime.read().await.as_ref() {
            runtime.preferences_changed(user_id)?;
        }
        Ok(())
    }
}
