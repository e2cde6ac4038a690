//! Background runtime for the activity monitor and the profile learner.
//!
//! Wires monitor triggers into [`NotificationEngine::process_trigger`] and
//! manages the learner schedule, with unified startup and graceful shutdown.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::activity::{ActivityMonitor, AnalysisRequestReceiver};
use crate::engine::NotificationEngine;
use crate::error::{HushError, HushResult};
use crate::learner::LearnerScheduler;
use crate::types::ChatMessage;

/// Configuration for the BackgroundRuntime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Whether to run the activity monitor and trigger dispatcher (default: true).
    pub enable_monitor: bool,
    /// Whether to schedule the profile learner (default: true).
    pub enable_learner: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enable_monitor: true,
            enable_learner: true,
        }
    }
}

impl RuntimeConfig {
    /// Disable the activity monitor. Analyses then only run on demand.
    pub fn without_monitor(mut self) -> Self {
        self.enable_monitor = false;
        self
    }

    /// Disable the learner schedule.
    pub fn without_learner(mut self) -> Self {
        self.enable_learner = false;
        self
    }

    /// Create config from environment variables.
    ///
    /// Reads:
    /// - `HUSH_DISABLE_MONITOR`
    /// - `HUSH_DISABLE_LEARNER`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if std::env::var("HUSH_DISABLE_MONITOR").is_ok() {
            config.enable_monitor = false;
        }

        if std::env::var("HUSH_DISABLE_LEARNER").is_ok() {
            config.enable_learner = false;
        }

        config
    }
}

/// Background runtime around a [`NotificationEngine`].
///
/// ```ignore
/// let engine = Arc::new(NotificationEngine::new(config, llm, embedder, stores, transport)?);
/// let mut runtime = BackgroundRuntime::new(engine, RuntimeConfig::default()).await?;
/// runtime.start().await?;
///
/// runtime.message_posted(&message).await?;
///
/// runtime.shutdown().await?;
/// ```
pub struct BackgroundRuntime {
    engine: Arc<NotificationEngine>,
    monitor: Option<ActivityMonitor>,
    dispatcher: Option<JoinHandle<()>>,
    learner_scheduler: Option<LearnerScheduler>,
    config: RuntimeConfig,
}

impl BackgroundRuntime {
    /// Create the runtime. The monitor and dispatcher start immediately;
    /// the learner schedule begins on [`start`](Self::start).
    pub async fn new(engine: Arc<NotificationEngine>, config: RuntimeConfig) -> HushResult<Self> {
        debug!(
            monitor_enabled = config.enable_monitor,
            learner_enabled = config.enable_learner,
            "Creating BackgroundRuntime"
        );

        let (monitor, dispatcher) = if config.enable_monitor {
            let (monitor, requests) = ActivityMonitor::spawn(
                engine.config().activity.clone(),
                engine.preference_store().clone(),
            );
            let dispatcher = tokio::spawn(dispatch(engine.clone(), requests));
            (Some(monitor), Some(dispatcher))
        } else {
            (None, None)
        };

        let learner_scheduler = if config.enable_learner {
            let scheduler = LearnerScheduler::new(engine.learner().clone())
                .await
                .map_err(|e| HushError::internal(format!("Failed to create learner scheduler: {}", e)))?;
            Some(scheduler)
        } else {
            None
        };

        Ok(Self {
            engine,
            monitor,
            dispatcher,
            learner_scheduler,
            config,
        })
    }

    /// Start the learner schedule.
    pub async fn start(&self) -> HushResult<()> {
        if let Some(ref scheduler) = self.learner_scheduler {
            scheduler.start().await?;
            info!(
                cron = %self.engine.learner().config().cron,
                "Learner scheduler started"
            );
        }
        info!("Background runtime started");
        Ok(())
    }

    /// Stop the monitor, drain in-flight triggers and stop the learner.
    pub async fn shutdown(&mut self) -> HushResult<()> {
        debug!("Shutting down background runtime");

        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                warn!(error = %e, "Trigger dispatcher ended abnormally");
            }
        }
        if let Some(ref mut scheduler) = self.learner_scheduler {
            scheduler.shutdown().await?;
            debug!("Learner scheduler stopped");
        }

        info!("Background runtime stopped");
        Ok(())
    }

    /// Feed a stored message to the monitor of every participant of its
    /// conversation, the sender included.
    pub async fn message_posted(&self, message: &ChatMessage) -> HushResult<()> {
        let Some(ref monitor) = self.monitor else {
            return Ok(());
        };
        let participants = self
            .engine
            .messages()
            .participants(&message.conversation_id)
            .await?;
        for user_id in participants {
            monitor.message_received(user_id, message.clone())?;
        }
        Ok(())
    }

    /// Record that a user opened or left a conversation.
    pub fn set_viewing(&self, user_id: &str, conversation_id: &str, viewing: bool) -> HushResult<()> {
        self.engine.set_viewing(user_id, conversation_id, viewing);
        if let Some(ref monitor) = self.monitor {
            monitor.viewing_changed(user_id, conversation_id, viewing)?;
        }
        Ok(())
    }

    /// Reload activity thresholds after a preference update.
    pub fn preferences_changed(&self, user_id: &str) -> HushResult<()> {
        if let Some(ref monitor) = self.monitor {
            monitor.preferences_changed(user_id)?;
        }
        Ok(())
    }

    /// Users the activity monitor currently tracks, when it runs.
    pub fn tracked_users(&self) -> Option<usize> {
        self.monitor.as_ref().map(ActivityMonitor::tracked_users)
    }

    pub fn engine(&self) -> &Arc<NotificationEngine> {
        &self.engine
    }

    pub fn learner_scheduler(&self) -> Option<&LearnerScheduler> {
        self.learner_scheduler.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

/// Run one analysis per request until the monitor closes the channel.
async fn dispatch(engine: Arc<NotificationEngine>, mut requests: AnalysisRequestReceiver) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else { break };
                let engine = engine.clone();
                tasks.spawn(async move {
                    match engine.process_trigger(&request).await {
                        Ok(Some(outcome)) => debug!(
                            conversation_id = %request.conversation_id,
                            user_id = %request.user_id,
                            delivered = outcome.is_delivered(),
                            "Trigger handled"
                        ),
                        Ok(None) => {}
                        Err(e) => warn!(
                            conversation_id = %request.conversation_id,
                            user_id = %request.user_id,
                            error = %e,
                            code = e.code().as_str(),
                            "Triggered analysis failed"
                        ),
                    }
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Trigger task panicked");
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Trigger task panicked");
        }
    }
    debug!("Trigger dispatcher stopped");
}
