//! Feedback-driven preference learning.
//!
//! The learner recomputes each user's [`UserNotificationProfile`] from the
//! full feedback history. Feedback records and decisions are never modified;
//! the profile is the only thing written.

mod profile;
mod scheduler;

pub use profile::compute_profile;
pub use scheduler::LearnerScheduler;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::HushResult;
use crate::traits::{FeedbackStore, PreferenceStore};
use crate::types::UserNotificationProfile;

/// Learner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Cron expression (with seconds) for scheduled runs. Default: Mondays 03:00 UTC.
    pub cron: String,
    /// Records a term must appear in before it is learned or suppressed.
    pub min_term_occurrences: usize,
    /// Cap on learned keywords and on suppressed topics.
    pub max_terms: usize,
    /// Run once when the scheduler starts.
    pub run_on_start: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 3 * * Mon".to_string(),
            min_term_occurrences: 3,
            max_terms: 20,
            run_on_start: false,
        }
    }
}

/// Result of a learner run over all users.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearnerRunSummary {
    /// Profiles written.
    pub updated: usize,
    /// Users whose profile could not be computed or stored.
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LearnerRunSummary {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ..Default::default()
        }
    }

    fn complete(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    /// Duration of the run.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Recomputes profiles from feedback.
pub struct Learner {
    feedback: Arc<dyn FeedbackStore>,
    preferences: Arc<dyn PreferenceStore>,
    config: LearnerConfig,
}

impl Learner {
    pub fn new(
        feedback: Arc<dyn FeedbackStore>,
        preferences: Arc<dyn PreferenceStore>,
        config: LearnerConfig,
    ) -> Self {
        Self {
            feedback,
            preferences,
            config,
        }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Recompute and store one user's profile.
    pub fn run_for_user(&self, user_id: &str) -> HushResult<UserNotificationProfile> {
        let records = self.feedback.list_for_user(user_id)?;
        let profile = compute_profile(user_id, &records, &self.config, Utc::now());
        self.preferences.put_profile(&profile)?;

        debug!(
            user_id = %user_id,
            feedback_count = profile.feedback_count,
            accuracy = profile.accuracy,
            learned_keywords = profile.learned_keywords.len(),
            suppressed_topics = profile.suppressed_topics.len(),
            rate = %profile.preferred_notification_rate,
            "Profile recomputed"
        );
        Ok(profile)
    }

    /// Recompute profiles for every user with feedback. A failure for one user
    /// does not stop the run.
    pub fn run_all(&self) -> HushResult<LearnerRunSummary> {
        let mut summary = LearnerRunSummary::new();

        for user_id in self.feedback.users_with_feedback()? {
            match self.run_for_user(&user_id) {
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Profile recomputation failed");
                    summary.failed += 1;
                }
            }
        }

        let summary = summary.complete();
        info!(
            updated = summary.updated,
            failed = summary.failed,
            duration_ms = summary.duration_ms().unwrap_or(0),
            "Learner run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::traits::DecisionLog;
    use crate::types::{
        DecisionSource, Feedback, FeedbackRecord, NotificationDecision, Priority, Verdict,
    };

    fn learner() -> (Learner, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (
            Learner::new(store.clone(), store.clone(), LearnerConfig::default()),
            store,
        )
    }

    fn rate(store: &SqliteStore, user: &str, text: &str, feedback: Feedback) {
        let decision = NotificationDecision::from_verdict(
            Verdict::notify(Priority::Medium, "test", text),
            DecisionSource::Inferred,
            user,
            "conv-1",
            vec!["m1".to_string()],
            "key",
            Utc::now(),
        );
        DecisionLog::append(store, &decision).unwrap();
        FeedbackStore::append(store, &FeedbackRecord::new(decision, feedback, Utc::now())).unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config = LearnerConfig::default();
        assert_eq!(config.cron, "0 0 3 * * Mon");
        assert_eq!(config.min_term_occurrences, 3);
        assert!(!config.run_on_start);
    }

    #[test]
    fn test_run_for_user_writes_profile() {
        let (learner, store) = learner();
        for _ in 0..5 {
            rate(&store, "alice", "lunch plans", Feedback::NotHelpful);
        }

        let profile = learner.run_for_user("alice").unwrap();
        assert!(profile.suppressed_topics.contains("lunch"));

        let stored = store.get_profile("alice").unwrap().unwrap();
        assert_eq!(stored, profile);
    }

    #[test]
    fn test_run_all_covers_every_user() {
        let (learner, store) = learner();
        rate(&store, "alice", "deploy", Feedback::Helpful);
        rate(&store, "bob", "deploy", Feedback::NotHelpful);

        let summary = learner.run_all().unwrap();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.completed_at.is_some());
        assert_eq!(store.get_profile("bob").unwrap().unwrap().feedback_count, 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (learner, store) = learner();
        for _ in 0..3 {
            rate(&store, "alice", "invoice approval", Feedback::Helpful);
        }
        let first = learner.run_for_user("alice").unwrap();
        let second = learner.run_for_user("alice").unwrap();
        assert_eq!(first.learned_keywords, second.learned_keywords);
        assert_eq!(first.accuracy, second.accuracy);
    }
}
