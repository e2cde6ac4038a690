//! User feedback on delivered decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::decision::NotificationDecision;

/// Thumbs up / thumbs down on a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
}

/// Append-only record of feedback, embedding a copy of the decision it rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_id: String,
    pub decision: NotificationDecision,
    pub feedback: Feedback,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(decision: NotificationDecision, feedback: Feedback, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: decision.user_id.clone(),
            decision,
            feedback,
            timestamp,
        }
    }

    pub fn is_helpful(&self) -> bool {
        self.feedback == Feedback::Helpful
    }
}
