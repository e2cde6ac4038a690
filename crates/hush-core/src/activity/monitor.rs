//! Activity monitor task.
//!
//! A router task fans events out to one actor task per user. Each actor owns
//! the `conversation_id -> state` map for its user and sleeps until the
//! earliest pending deadline. Senders never wait on analysis: events are
//! enqueued and triggers are sent to the dispatcher as [`AnalysisRequest`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::{ConversationActivityState, Thresholds, Trigger};
use super::ActivityConfig;
use crate::error::{HushError, HushResult};
use crate::traits::PreferenceStore;
use crate::types::ChatMessage;

/// Input to the monitor.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    /// A message arrived in a conversation `user_id` participates in.
    MessageReceived { user_id: String, message: ChatMessage },
    /// `user_id` started or stopped viewing a conversation.
    ViewingChanged {
        user_id: String,
        conversation_id: String,
        viewing: bool,
    },
    /// `user_id` saved new preferences; thresholds are reloaded.
    PreferencesChanged { user_id: String },
}

impl ActivityEvent {
    fn user_id(&self) -> &str {
        match self {
            Self::MessageReceived { user_id, .. }
            | Self::ViewingChanged { user_id, .. }
            | Self::PreferencesChanged { user_id } => user_id,
        }
    }
}

/// A trigger fired: analyze `conversation_id` for `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub trigger: Trigger,
    pub requested_at: DateTime<Utc>,
}

/// Channel for receiving analysis requests from the monitor.
pub type AnalysisRequestReceiver = mpsc::UnboundedReceiver<AnalysisRequest>;

/// Handle to the running monitor.
pub struct ActivityMonitor {
    events: mpsc::UnboundedSender<ActivityEvent>,
    router: JoinHandle<()>,
    tracked_users: Arc<AtomicUsize>,
}

impl ActivityMonitor {
    /// Spawn the monitor. Returns the handle and the receiver of analysis requests.
    pub fn spawn(
        config: ActivityConfig,
        preferences: Arc<dyn PreferenceStore>,
    ) -> (Self, AnalysisRequestReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let tracked_users = Arc::new(AtomicUsize::new(0));

        let router = tokio::spawn(route(
            events_rx,
            ActorContext {
                config,
                preferences,
                requests: requests_tx,
            },
            tracked_users.clone(),
        ));
        debug!("Activity monitor started");

        (
            Self {
                events: events_tx,
                router,
                tracked_users,
            },
            requests_rx,
        )
    }

    fn send(&self, event: ActivityEvent) -> HushResult<()> {
        self.events
            .send(event)
            .map_err(|_| HushError::internal("Activity monitor is not running"))
    }

    /// Record a message for one participant. Messages authored by the
    /// participant count as activity by the reader.
    pub fn message_received(&self, user_id: impl Into<String>, message: ChatMessage) -> HushResult<()> {
        self.send(ActivityEvent::MessageReceived {
            user_id: user_id.into(),
            message,
        })
    }

    pub fn viewing_changed(
        &self,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        viewing: bool,
    ) -> HushResult<()> {
        self.send(ActivityEvent::ViewingChanged {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            viewing,
        })
    }

    pub fn preferences_changed(&self, user_id: impl Into<String>) -> HushResult<()> {
        self.send(ActivityEvent::PreferencesChanged {
            user_id: user_id.into(),
        })
    }

    /// Users with a running actor, i.e. with tracked activity.
    pub fn tracked_users(&self) -> usize {
        self.tracked_users.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait for all actors to finish.
    pub async fn shutdown(self) {
        drop(self.events);
        if let Err(e) = self.router.await {
            warn!(error = %e, "Activity monitor router ended abnormally");
        }
        info!("Activity monitor stopped");
    }
}

/// Shared by every actor.
#[derive(Clone)]
struct ActorContext {
    config: ActivityConfig,
    preferences: Arc<dyn PreferenceStore>,
    requests: mpsc::UnboundedSender<AnalysisRequest>,
}

/// Router-side handle of one actor.
struct ActorHandle {
    events: mpsc::UnboundedSender<ActivityEvent>,
    generation: u64,
    sent: u64,
}

/// An actor has no tracked conversations left after `received` events.
struct IdleNotice {
    user_id: String,
    generation: u64,
    received: u64,
}

async fn route(
    mut events: mpsc::UnboundedReceiver<ActivityEvent>,
    context: ActorContext,
    tracked_users: Arc<AtomicUsize>,
) {
    let (idle_tx, mut idle_rx) = mpsc::unbounded_channel::<IdleNotice>();
    let mut actors: HashMap<String, ActorHandle> = HashMap::new();
    let mut tasks = JoinSet::new();
    let mut generation = 0u64;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let user_id = event.user_id().to_string();
                let actor = actors.entry(user_id.clone()).or_insert_with(|| {
                    generation += 1;
                    let (tx, rx) = mpsc::unbounded_channel();
                    tasks.spawn(run_user(
                        user_id.clone(),
                        generation,
                        rx,
                        context.clone(),
                        idle_tx.clone(),
                    ));
                    debug!(user_id = %user_id, generation, "Spawned activity actor");
                    ActorHandle {
                        events: tx,
                        generation,
                        sent: 0,
                    }
                });
                if actor.events.send(event).is_ok() {
                    actor.sent += 1;
                } else {
                    warn!(user_id = %user_id, "Activity actor is gone, dropping event");
                    actors.remove(&user_id);
                }
                tracked_users.store(actors.len(), Ordering::Relaxed);
            }
            Some(notice) = idle_rx.recv() => {
                // A notice is stale once more events were routed to the actor.
                let current = actors.get(&notice.user_id).is_some_and(|a| {
                    a.generation == notice.generation && a.sent == notice.received
                });
                if current {
                    actors.remove(&notice.user_id);
                    tracked_users.store(actors.len(), Ordering::Relaxed);
                    debug!(user_id = %notice.user_id, "Retired idle activity actor");
                }
            }
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(actors);
    tracked_users.store(0, Ordering::Relaxed);
    while tasks.join_next().await.is_some() {}
}

fn load_thresholds(
    user_id: &str,
    config: &ActivityConfig,
    preferences: &dyn PreferenceStore,
) -> Thresholds {
    match preferences.get_preferences(user_id) {
        Ok(saved) => config.thresholds(saved.as_ref()),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to load preferences, using defaults");
            config.thresholds(None)
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// One user's actor. Runs until the router drops its sender, which happens
/// on shutdown or after an [`IdleNotice`] no later event overtook.
async fn run_user(
    user_id: String,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<ActivityEvent>,
    context: ActorContext,
    idle: mpsc::UnboundedSender<IdleNotice>,
) {
    let ActorContext {
        config,
        preferences,
        requests,
    } = context;
    let mut thresholds = load_thresholds(&user_id, &config, preferences.as_ref());
    let mut conversations: HashMap<String, ConversationActivityState> = HashMap::new();
    let mut received = 0u64;
    let mut notified = false;

    let emit = |conversation_id: &str, trigger: Trigger| {
        info!(
            user_id = %user_id,
            conversation_id = %conversation_id,
            trigger = ?trigger,
            "Analysis triggered"
        );
        let request = AnalysisRequest {
            user_id: user_id.clone(),
            conversation_id: conversation_id.to_string(),
            trigger,
            requested_at: Utc::now(),
        };
        if requests.send(request).is_err() {
            warn!(user_id = %user_id, "Analysis dispatcher is gone, dropping trigger");
        }
    };

    loop {
        let deadline = conversations
            .values()
            .filter_map(|s| {
                s.next_deadline(&thresholds)
                    .or_else(|| s.idle_at(&thresholds))
            })
            .min();

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                received += 1;
                notified = false;
                let now = Instant::now();
                match event {
                    ActivityEvent::MessageReceived { message, .. } => {
                        let state = conversations
                            .entry(message.conversation_id.clone())
                            .or_default();
                        if message.is_from(&user_id) {
                            state.on_own_message(now);
                        } else if let Some(trigger) = state.on_message(now, &thresholds) {
                            emit(&message.conversation_id, trigger);
                        } else if state.phase() == super::ActivityPhase::Debounced {
                            debug!(
                                user_id = %user_id,
                                conversation_id = %message.conversation_id,
                                pending = state.pending(),
                                "Trigger held back by debounce"
                            );
                        }
                    }
                    ActivityEvent::ViewingChanged { conversation_id, viewing, .. } => {
                        conversations.entry(conversation_id).or_default().set_viewing(viewing);
                    }
                    ActivityEvent::PreferencesChanged { .. } => {
                        thresholds = load_thresholds(&user_id, &config, preferences.as_ref());
                    }
                }
            }
            _ = sleep_until(deadline) => {
                let now = Instant::now();
                for (conversation_id, state) in conversations.iter_mut() {
                    if let Some(trigger) = state.on_tick(now, &thresholds) {
                        emit(conversation_id, trigger);
                    }
                }
            }
        }

        let now = Instant::now();
        conversations.retain(|_, state| !state.is_idle(now, &thresholds));
        if conversations.is_empty() && !notified {
            notified = true;
            let notice = IdleNotice {
                user_id: user_id.clone(),
                generation,
                received,
            };
            if idle.send(notice).is_err() {
                break;
            }
        }
    }

    debug!(user_id = %user_id, "Activity actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::time::Duration;

    fn message(id: &str, sender: &str) -> ChatMessage {
        ChatMessage::new(id, "conv-1", sender, sender, "hello there", Utc::now())
    }

    fn monitor() -> (ActivityMonitor, AnalysisRequestReceiver) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        ActivityMonitor::spawn(ActivityConfig::default(), store)
    }

    /// Let spawned tasks process queued events without moving the clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_trigger_emits_request() {
        let (monitor, mut requests) = monitor();
        monitor.message_received("alice", message("m1", "bob")).unwrap();
        settle().await;
        assert!(requests.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(121)).await;
        let request = requests.recv().await.unwrap();
        assert_eq!(request.user_id, "alice");
        assert_eq!(request.conversation_id, "conv-1");
        assert_eq!(request.trigger, Trigger::Pause);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_allows_one_run_per_window() {
        let (monitor, mut requests) = monitor();
        for i in 0..21 {
            monitor.message_received("alice", message(&format!("a{}", i), "bob")).unwrap();
        }
        settle().await;
        assert_eq!(requests.try_recv().unwrap().trigger, Trigger::Threshold);

        // Second burst one minute later would trigger again without debounce.
        tokio::time::sleep(Duration::from_secs(60)).await;
        for i in 0..21 {
            monitor.message_received("alice", message(&format!("b{}", i), "bob")).unwrap();
        }
        settle().await;
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(requests.try_recv().is_err());

        // Held-back activity runs once the debounce window ends.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(requests.recv().await.unwrap().trigger, Trigger::Threshold);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewing_user_is_never_triggered() {
        let (monitor, mut requests) = monitor();
        monitor.viewing_changed("alice", "conv-1", true).unwrap();
        for i in 0..30 {
            monitor.message_received("alice", message(&format!("m{}", i), "bob")).unwrap();
        }
        settle().await;
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert!(requests.try_recv().is_err());

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_actor_is_retired_and_respawned() {
        let (monitor, mut requests) = monitor();
        monitor.message_received("alice", message("m1", "bob")).unwrap();
        settle().await;
        assert_eq!(monitor.tracked_users(), 1);

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(requests.recv().await.unwrap().trigger, Trigger::Pause);
        settle().await;
        // Still inside the debounce window.
        assert_eq!(monitor.tracked_users(), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(monitor.tracked_users(), 0);

        monitor.message_received("alice", message("m2", "bob")).unwrap();
        settle().await;
        assert_eq!(monitor.tracked_users(), 1);
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(requests.recv().await.unwrap().trigger, Trigger::Pause);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_a_quiet_conversation_drops_its_state() {
        let (monitor, _requests) = monitor();
        monitor.viewing_changed("alice", "conv-1", true).unwrap();
        settle().await;
        assert_eq!(monitor.tracked_users(), 1);

        monitor.viewing_changed("alice", "conv-1", false).unwrap();
        settle().await;
        assert_eq!(monitor.tracked_users(), 0);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_tracked_independently() {
        let (monitor, mut requests) = monitor();
        monitor.message_received("alice", message("m1", "bob")).unwrap();
        monitor.message_received("carol", message("m1", "bob")).unwrap();
        monitor.message_received("bob", message("m1", "bob")).unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(121)).await;
        let mut users = vec![
            requests.recv().await.unwrap().user_id,
            requests.recv().await.unwrap().user_id,
        ];
        users.sort();
        assert_eq!(users, vec!["alice".to_string(), "carol".to_string()]);
        settle().await;
        assert!(requests.try_recv().is_err());

        monitor.shutdown().await;
    }
}
