//! Activity monitoring: decides *when* to analyze a conversation.

mod monitor;
mod state;

pub use monitor::{
    ActivityEvent, ActivityMonitor, AnalysisRequest, AnalysisRequestReceiver,
};
pub use state::{ActivityPhase, ConversationActivityState, Thresholds, Trigger};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::UserNotificationPreferences;

/// Activity monitor configuration.
///
/// Pause and count thresholds here apply to users without saved preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub pause_threshold_secs: u64,
    pub message_count_threshold: u32,
    /// Rolling window for the message-count trigger.
    pub window_secs: u64,
    /// Cool-down after a trigger.
    pub debounce_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            pause_threshold_secs: 120,
            message_count_threshold: 20,
            window_secs: 600,
            debounce_secs: 300,
        }
    }
}

impl ActivityConfig {
    /// Thresholds for a user, taking pause and count from saved preferences.
    pub fn thresholds(&self, preferences: Option<&UserNotificationPreferences>) -> Thresholds {
        let (pause, count) = preferences.map_or(
            (self.pause_threshold_secs, self.message_count_threshold),
            |p| (p.pause_threshold_seconds, p.message_count_threshold),
        );
        Thresholds {
            pause: Duration::from_secs(pause),
            message_count: count,
            window: Duration::from_secs(self.window_secs),
            debounce: Duration::from_secs(self.debounce_secs),
        }
    }
}
