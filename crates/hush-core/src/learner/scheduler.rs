//! Periodic scheduler for the learner.
//!
//! Uses tokio-cron-scheduler to run [`Learner::run_all`] on the configured
//! cron schedule, independent of live analysis.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use super::{Learner, LearnerRunSummary};
use crate::error::{HushError, HushResult};

/// Scheduler for periodic learner runs.
///
/// # Example
///
/// ```ignore
/// use hush_core::learner::{Learner, LearnerConfig, LearnerScheduler};
/// use hush_core::store::SqliteStore;
/// use std::sync::Arc;
///
/// # async fn example() -> hush_core::HushResult<()> {
/// let store = Arc::new(SqliteStore::in_memory()?);
/// let learner = Arc::new(Learner::new(store.clone(), store, LearnerConfig::default()));
///
/// let mut scheduler = LearnerScheduler::new(learner).await?;
/// scheduler.start().await?;
/// // ...
/// scheduler.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct LearnerScheduler {
    scheduler: JobScheduler,
    learner: Arc<Learner>,
}

fn scheduler_error(context: &str, e: impl std::fmt::Display) -> HushError {
    HushError::internal(format!("{}: {}", context, e))
}

impl LearnerScheduler {
    /// Create a new scheduler. Call `start()` to begin periodic execution.
    pub async fn new(learner: Arc<Learner>) -> HushResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| scheduler_error("Failed to create scheduler", e))?;

        Ok(Self { scheduler, learner })
    }

    /// Start the scheduler.
    pub async fn start(&self) -> HushResult<()> {
        let learner = self.learner.clone();
        let cron = self.learner.config().cron.clone();

        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let learner = learner.clone();
            Box::pin(async move {
                debug!("Starting scheduled learner run");
                let result = tokio::task::spawn_blocking(move || learner.run_all()).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %e, "Learner run failed"),
                    Err(e) => error!(error = %e, "Learner task panicked"),
                }
            })
        })
        .map_err(|e| scheduler_error("Failed to create learner job", e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| scheduler_error("Failed to add learner job", e))?;

        if self.learner.config().run_on_start {
            debug!("Running initial learner pass on start");
            if let Err(e) = self.learner.run_all() {
                error!(error = %e, "Initial learner run failed");
            }
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| scheduler_error("Failed to start scheduler", e))?;

        info!(cron = %cron, "Learner scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully.
    pub async fn shutdown(&mut self) -> HushResult<()> {
        info!("Shutting down learner scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| scheduler_error("Failed to stop scheduler", e))
    }

    /// Run the learner now, outside the schedule.
    pub fn run_now(&self) -> HushResult<LearnerRunSummary> {
        self.learner.run_all()
    }

    pub fn learner(&self) -> &Arc<Learner> {
        &self.learner
    }
}
