//! Per-user notification preferences and the learned profile.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What to do when inference may not be consulted (rate limit exceeded).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Apply the deterministic rule set.
    #[default]
    SimpleRules,
    /// Notify for every analysis.
    NotifyAll,
    /// Never notify.
    SuppressAll,
}

/// A daily window during which non-urgent notifications are held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    /// Local start time (inclusive).
    pub start: NaiveTime,
    /// Local end time (exclusive). May be earlier than `start` to cross midnight.
    pub end: NaiveTime,
    /// Offset of the user's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            utc_offset_minutes: 0,
        }
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = (now + Duration::minutes(self.utc_offset_minutes as i64)).time();
        if self.start == self.end {
            return false;
        }
        if self.start < self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }
}

/// User-editable notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotificationPreferences {
    pub user_id: String,
    pub enabled: bool,
    pub pause_threshold_seconds: u64,
    pub message_count_threshold: u32,
    #[serde(default)]
    pub priority_keywords: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    pub max_analyses_per_hour: u32,
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
    /// Bumped on every write; part of the decision cache key.
    #[serde(default)]
    pub version: u64,
}

impl UserNotificationPreferences {
    /// Default preferences for a user who has never saved any.
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            enabled: true,
            pause_threshold_seconds: 120,
            message_count_threshold: 20,
            priority_keywords: BTreeSet::new(),
            quiet_hours: None,
            max_analyses_per_hour: 20,
            fallback_strategy: FallbackStrategy::SimpleRules,
            version: 0,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_quiet_hours(mut self, quiet_hours: QuietHours) -> Self {
        self.quiet_hours = Some(quiet_hours);
        self
    }

    pub fn with_fallback_strategy(mut self, strategy: FallbackStrategy) -> Self {
        self.fallback_strategy = strategy;
        self
    }

    pub fn with_max_analyses_per_hour(mut self, max: u32) -> Self {
        self.max_analyses_per_hour = max;
        self
    }

    /// Whether `now` is inside the configured quiet hours.
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        self.quiet_hours.map_or(false, |q| q.contains(now))
    }
}

/// Learner's view of how notifications should trend for a user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationRate {
    More,
    #[default]
    Same,
    Fewer,
}

/// Per-user profile derived entirely from feedback history.
///
/// Written only by the learner; read-only to every other component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotificationProfile {
    pub user_id: String,
    pub preferred_notification_rate: NotificationRate,
    #[serde(default)]
    pub learned_keywords: BTreeSet<String>,
    #[serde(default)]
    pub suppressed_topics: BTreeSet<String>,
    pub accuracy: f32,
    pub feedback_count: usize,
    pub computed_at: DateTime<Utc>,
}

impl UserNotificationProfile {
    /// A profile with no learned signal.
    pub fn empty(user_id: impl Into<String>, computed_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            preferred_notification_rate: NotificationRate::Same,
            learned_keywords: BTreeSet::new(),
            suppressed_topics: BTreeSet::new(),
            accuracy: 0.0,
            feedback_count: 0,
            computed_at,
        }
    }
}

/// The keyword set consulted by the classifier: priority keywords plus learned
/// keywords, deduplicated case-insensitively. Returned lowercased and trimmed.
pub fn effective_keywords(
    preferences: &UserNotificationPreferences,
    profile: Option<&UserNotificationProfile>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let learned = profile.into_iter().flat_map(|p| p.learned_keywords.iter());

    preferences
        .priority_keywords
        .iter()
        .chain(learned)
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_quiet_hours_same_day() {
        let q = QuietHours::new(time(12, 0), time(13, 0));
        assert!(q.contains(at(12, 30)));
        assert!(!q.contains(at(13, 0)));
        assert!(!q.contains(at(11, 59)));
    }

    #[test]
    fn test_quiet_hours_cross_midnight() {
        let q = QuietHours::new(time(22, 0), time(7, 0));
        assert!(q.contains(at(23, 0)));
        assert!(q.contains(at(3, 0)));
        assert!(!q.contains(at(7, 0)));
        assert!(!q.contains(at(15, 0)));
    }

    #[test]
    fn test_quiet_hours_offset() {
        // 22:00-07:00 in UTC+2: 21:00 UTC is 23:00 local
        let q = QuietHours::new(time(22, 0), time(7, 0)).with_utc_offset_minutes(120);
        assert!(q.contains(at(21, 0)));
        assert!(!q.contains(at(19, 0)));
    }

    #[test]
    fn test_empty_quiet_window() {
        let q = QuietHours::new(time(9, 0), time(9, 0));
        assert!(!q.contains(at(9, 0)));
    }

    #[test]
    fn test_effective_keywords_deduplicate_case_insensitively() {
        let prefs = UserNotificationPreferences::defaults_for("alice")
            .with_keywords(["Urgent", "deploy"]);
        let mut profile = UserNotificationProfile::empty("alice", Utc::now());
        profile.learned_keywords.insert("urgent".to_string());
        profile.learned_keywords.insert("Invoice".to_string());

        let keywords = effective_keywords(&prefs, Some(&profile));
        assert_eq!(keywords.len(), 3);
        assert!(keywords.contains(&"urgent".to_string()));
        assert!(keywords.contains(&"deploy".to_string()));
        assert!(keywords.contains(&"invoice".to_string()));
    }

    #[test]
    fn test_fallback_strategy_serialization() {
        let json = serde_json::to_string(&FallbackStrategy::SuppressAll).unwrap();
        assert_eq!(json, "\"suppress-all\"");
        let parsed: FallbackStrategy = serde_json::from_str("\"notify-all\"").unwrap();
        assert_eq!(parsed, FallbackStrategy::NotifyAll);
    }
}
