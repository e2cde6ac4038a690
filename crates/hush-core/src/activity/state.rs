//! Per-(user, conversation) activity state machine.
//!
//! `Idle -> Accumulating -> (PauseTriggered | ThresholdTriggered) -> Debounced -> Idle`
//!
//! The state is pure: callers pass the current instant, and the monitor task
//! drives it from events and timers.

use std::time::Duration;

use tokio::time::Instant;

/// Phase of a conversation's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityPhase {
    Idle,
    Accumulating,
    PauseTriggered,
    ThresholdTriggered,
    Debounced,
}

/// What caused an analysis to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// No new message for the pause threshold.
    Pause,
    /// Message count exceeded the threshold within the window.
    Threshold,
}

/// Timing parameters for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub pause: Duration,
    pub message_count: u32,
    pub window: Duration,
    pub debounce: Duration,
}

/// Activity of one conversation as seen by one user. Never persisted.
#[derive(Debug, Clone)]
pub struct ConversationActivityState {
    pub message_count_in_window: u32,
    pub window_start: Option<Instant>,
    pub last_message_at: Option<Instant>,
    pub last_analysis_at: Option<Instant>,
    pub is_user_viewing: bool,
    /// Messages from others since the last trigger.
    pending: u32,
    phase: ActivityPhase,
}

impl Default for ConversationActivityState {
    fn default() -> Self {
        Self {
            message_count_in_window: 0,
            window_start: None,
            last_message_at: None,
            last_analysis_at: None,
            is_user_viewing: false,
            pending: 0,
            phase: ActivityPhase::Idle,
        }
    }
}

impl ConversationActivityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ActivityPhase {
        self.phase
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    fn debounce_until(&self, th: &Thresholds) -> Option<Instant> {
        self.last_analysis_at.map(|at| at + th.debounce)
    }

    fn is_debounced(&self, now: Instant, th: &Thresholds) -> bool {
        self.debounce_until(th).map_or(false, |until| now < until)
    }

    fn reset_window(&mut self) {
        self.message_count_in_window = 0;
        self.window_start = None;
    }

    fn fire(&mut self, now: Instant, trigger: Trigger) -> Trigger {
        self.last_analysis_at = Some(now);
        self.pending = 0;
        self.reset_window();
        self.phase = match trigger {
            Trigger::Pause => ActivityPhase::PauseTriggered,
            Trigger::Threshold => ActivityPhase::ThresholdTriggered,
        };
        trigger
    }

    /// A message from another participant arrived.
    pub fn on_message(&mut self, now: Instant, th: &Thresholds) -> Option<Trigger> {
        self.last_message_at = Some(now);

        if self.is_user_viewing {
            self.reset_window();
            self.pending = 0;
            self.phase = ActivityPhase::Idle;
            return None;
        }

        let window_expired = self
            .window_start
            .map_or(true, |start| now.duration_since(start) >= th.window);
        if window_expired {
            self.window_start = Some(now);
            self.message_count_in_window = 0;
        }
        self.message_count_in_window += 1;
        self.pending += 1;

        if self.is_debounced(now, th) {
            self.phase = ActivityPhase::Debounced;
            return None;
        }
        if self.message_count_in_window > th.message_count {
            return Some(self.fire(now, Trigger::Threshold));
        }
        self.phase = ActivityPhase::Accumulating;
        None
    }

    /// The tracked user wrote in the conversation, so everything before is seen.
    pub fn on_own_message(&mut self, now: Instant) {
        self.last_message_at = Some(now);
        self.pending = 0;
        self.reset_window();
        self.phase = ActivityPhase::Idle;
    }

    /// Focus changed. Starting to view clears accumulated activity.
    pub fn set_viewing(&mut self, viewing: bool) {
        self.is_user_viewing = viewing;
        if viewing {
            self.pending = 0;
            self.reset_window();
            self.phase = ActivityPhase::Idle;
        }
    }

    /// Timer check. Fires a threshold trigger held back by debounce, or a
    /// pause trigger once the conversation went quiet.
    pub fn on_tick(&mut self, now: Instant, th: &Thresholds) -> Option<Trigger> {
        if self.is_user_viewing || self.pending == 0 {
            if !self.is_debounced(now, th) {
                self.phase = ActivityPhase::Idle;
            }
            return None;
        }
        if self.is_debounced(now, th) {
            self.phase = ActivityPhase::Debounced;
            return None;
        }
        if self.message_count_in_window > th.message_count {
            return Some(self.fire(now, Trigger::Threshold));
        }
        let quiet = self
            .last_message_at
            .map_or(false, |last| now.duration_since(last) >= th.pause);
        if quiet {
            return Some(self.fire(now, Trigger::Pause));
        }
        None
    }

    /// Nothing pending, not viewed and outside the debounce window. Such a
    /// state behaves exactly like a fresh one and can be dropped.
    pub fn is_idle(&self, now: Instant, th: &Thresholds) -> bool {
        !self.is_user_viewing && self.pending == 0 && !self.is_debounced(now, th)
    }

    /// When a state with nothing pending becomes idle.
    pub fn idle_at(&self, th: &Thresholds) -> Option<Instant> {
        if self.is_user_viewing || self.pending > 0 {
            return None;
        }
        self.debounce_until(th)
    }

    /// Next instant at which [`on_tick`](Self::on_tick) may fire, if any.
    pub fn next_deadline(&self, th: &Thresholds) -> Option<Instant> {
        if self.is_user_viewing || self.pending == 0 {
            return None;
        }
        let debounce_end = self.debounce_until(th);
        if self.message_count_in_window > th.message_count {
            return Some(debounce_end.unwrap_or_else(Instant::now));
        }
        let pause_end = self.last_message_at.map(|last| last + th.pause)?;
        Some(debounce_end.map_or(pause_end, |d| d.max(pause_end)))
    }
}
