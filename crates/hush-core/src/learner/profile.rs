//! Profile computation from a feedback snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::LearnerConfig;
use crate::classifier::text::tokens;
use crate::types::{FeedbackRecord, NotificationRate, UserNotificationProfile};

/// Accuracy above which users are assumed to want more notifications.
const MORE_THRESHOLD: f32 = 0.7;
/// Accuracy below which users are assumed to want fewer notifications.
const FEWER_THRESHOLD: f32 = 0.4;
/// Accuracy drop between the older and recent half that counts as a decline.
const DECLINE_MARGIN: f32 = 0.2;
/// Minimum number of records before the halves are compared.
const MIN_TREND_RECORDS: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "asked", "asks", "back",
    "been", "before", "but", "can", "could", "did", "does", "for", "from", "get", "had", "has",
    "have", "her", "here", "him", "his", "how", "into", "its", "just", "let", "like", "more",
    "need", "needs", "new", "not", "now", "off", "one", "our", "out", "over", "said", "says",
    "she", "should", "some", "than", "that", "the", "their", "them", "then", "there", "they",
    "this", "today", "too", "want", "wants", "was", "what", "when", "where", "which", "who",
    "why", "will", "with", "would", "you", "your",
];

/// Distinct topical terms of a text.
fn terms(text: &str) -> HashSet<String> {
    tokens(text)
        .map(|t| t.trim_matches('\'').to_string())
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn accuracy(records: &[FeedbackRecord]) -> f32 {
    if records.is_empty() {
        return 0.0;
    }
    let helpful = records.iter().filter(|r| r.is_helpful()).count();
    helpful as f32 / records.len() as f32
}

fn rate(records: &[FeedbackRecord]) -> NotificationRate {
    if records.is_empty() {
        return NotificationRate::Same;
    }
    if records.len() < MIN_TREND_RECORDS {
        let overall = accuracy(records);
        return if overall > MORE_THRESHOLD {
            NotificationRate::More
        } else if overall < FEWER_THRESHOLD {
            NotificationRate::Fewer
        } else {
            NotificationRate::Same
        };
    }

    let (older, recent) = records.split_at(records.len() / 2);
    let (older, recent) = (accuracy(older), accuracy(recent));
    if recent < FEWER_THRESHOLD || older - recent > DECLINE_MARGIN {
        NotificationRate::Fewer
    } else if recent > MORE_THRESHOLD && recent >= older {
        NotificationRate::More
    } else {
        NotificationRate::Same
    }
}

/// Top `max` terms by count, then alphabetically.
fn strongest(mut counted: Vec<(String, usize)>, max: usize) -> BTreeSet<String> {
    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counted.into_iter().take(max).map(|(term, _)| term).collect()
}

/// Compute a user's profile from their full feedback history.
///
/// Pure and idempotent: the same snapshot always yields the same profile
/// (apart from `computed_at`). Terms are taken from the notification text of
/// rated decisions that notified; each term counts once per record.
pub fn compute_profile(
    user_id: &str,
    records: &[FeedbackRecord],
    config: &LearnerConfig,
    now: DateTime<Utc>,
) -> UserNotificationProfile {
    let mut ordered: Vec<FeedbackRecord> = records
        .iter()
        .filter(|r| r.user_id == user_id)
        .cloned()
        .collect();
    ordered.sort_by_key(|r| r.timestamp);

    let mut helpful_terms: HashMap<String, usize> = HashMap::new();
    let mut unhelpful_terms: HashMap<String, usize> = HashMap::new();
    for record in ordered.iter().filter(|r| r.decision.should_notify) {
        let Some(text) = record.decision.notification_text.as_deref() else {
            continue;
        };
        let counts = if record.is_helpful() {
            &mut helpful_terms
        } else {
            &mut unhelpful_terms
        };
        for term in terms(text) {
            *counts.entry(term).or_default() += 1;
        }
    }

    let all_terms: BTreeSet<&String> = helpful_terms.keys().chain(unhelpful_terms.keys()).collect();
    let mut learned = Vec::new();
    let mut suppressed = Vec::new();
    for term in all_terms {
        let helpful = helpful_terms.get(term).copied().unwrap_or(0);
        let unhelpful = unhelpful_terms.get(term).copied().unwrap_or(0);
        if helpful > unhelpful && helpful >= config.min_term_occurrences {
            learned.push((term.clone(), helpful));
        } else if unhelpful > helpful && unhelpful >= config.min_term_occurrences {
            suppressed.push((term.clone(), unhelpful));
        }
    }

    UserNotificationProfile {
        user_id: user_id.to_string(),
        preferred_notification_rate: rate(&ordered),
        learned_keywords: strongest(learned, config.max_terms),
        suppressed_topics: strongest(suppressed, config.max_terms),
        accuracy: accuracy(&ordered),
        feedback_count: ordered.len(),
        computed_at: now,
    }
}
