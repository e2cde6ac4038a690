//! Rule-based triage of an unread batch.
//!
//! One rule set serves two roles: live triage before inference, and the
//! deterministic fallback when inference is unavailable. The only difference
//! between the two is the priority assigned to keyword matches.

pub mod text;

use std::collections::BTreeSet;

use crate::types::{
    effective_keywords, ChatMessage, Priority, UserIdentity, UserNotificationPreferences,
    UserNotificationProfile, Verdict,
};

/// Maximum length of a notification body built from a message.
pub const EXCERPT_CHARS: usize = 140;

/// Which role the rule set is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMode {
    /// Live triage before inference.
    Triage,
    /// Replacement for an unavailable or invalid inference result.
    Fallback,
}

/// Result of heuristic triage.
#[derive(Debug, Clone, PartialEq)]
pub enum Triage {
    DefinitelyNotify(Verdict),
    DefinitelySkip(Verdict),
    NeedsInference,
}

impl Triage {
    /// The verdict, when the rules were conclusive.
    pub fn into_verdict(self) -> Option<Verdict> {
        match self {
            Triage::DefinitelyNotify(v) | Triage::DefinitelySkip(v) => Some(v),
            Triage::NeedsInference => None,
        }
    }
}

/// Everything the rules know about the reader.
#[derive(Debug, Clone)]
pub struct ClassifierProfile {
    pub identity: UserIdentity,
    /// Effective keyword set, lowercased and deduplicated.
    pub keywords: Vec<String>,
    pub suppressed_topics: BTreeSet<String>,
}

impl ClassifierProfile {
    pub fn new(
        identity: UserIdentity,
        preferences: &UserNotificationPreferences,
        profile: Option<&UserNotificationProfile>,
    ) -> Self {
        Self {
            identity,
            keywords: effective_keywords(preferences, profile),
            suppressed_topics: profile
                .map(|p| p.suppressed_topics.clone())
                .unwrap_or_default(),
        }
    }

    fn mentions(&self, message: &ChatMessage) -> bool {
        if message.mentions.iter().any(|m| m == &self.identity.user_id) {
            return true;
        }
        let handle = self.identity.handle.trim().trim_start_matches('@');
        if !handle.is_empty() && text::contains_word(&message.text, &format!("@{}", handle)) {
            return true;
        }
        self.identity
            .addressable_names()
            .iter()
            .any(|name| text::contains_word(&message.text, name))
    }

    fn is_named_in(&self, message: &ChatMessage) -> bool {
        let handle = self.identity.handle.trim().trim_start_matches('@');
        (!handle.is_empty() && text::contains_word(&message.text, handle)) || self.mentions(message)
    }
}

/// Messages from other participants, in order.
fn incoming<'a>(
    batch: &'a [ChatMessage],
    user_id: &'a str,
) -> impl DoubleEndedIterator<Item = &'a ChatMessage> {
    batch.iter().filter(move |m| !m.is_from(user_id))
}

/// Rules 1 to 3. Returns a notify verdict for the first rule that matches.
fn notify_rules(batch: &[ChatMessage], profile: &ClassifierProfile, mode: RuleMode) -> Option<Verdict> {
    let user_id = profile.identity.user_id.as_str();

    if let Some(message) = incoming(batch, user_id).rev().find(|m| profile.mentions(m)) {
        return Some(Verdict::notify(
            Priority::High,
            format!("mentioned by {}", message.sender_name),
            text::excerpt(&message.text, EXCERPT_CHARS),
        ));
    }

    if !profile.keywords.is_empty() {
        let hit = incoming(batch, user_id)
            .rev()
            .find_map(|m| text::find_keyword(&m.text, &profile.keywords).map(|k| (m, k)));
        if let Some((message, keyword)) = hit {
            let priority = match mode {
                RuleMode::Triage => Priority::High,
                RuleMode::Fallback => Priority::Medium,
            };
            return Some(Verdict::notify(
                priority,
                format!("keyword '{}' in message from {}", keyword, message.sender_name),
                text::excerpt(&message.text, EXCERPT_CHARS),
            ));
        }
    }

    let latest = incoming(batch, user_id).last()?;
    let asks = latest.text.trim_end().ends_with('?');
    if asks && (text::has_second_person(&latest.text) || profile.is_named_in(latest)) {
        return Some(Verdict::notify(
            Priority::Medium,
            format!("direct question from {}", latest.sender_name),
            text::excerpt(&latest.text, EXCERPT_CHARS),
        ));
    }

    None
}

/// Triage a batch of unread messages for the reader described by `profile`.
///
/// Rules, first match wins:
/// 1. explicit mention of the reader: notify, high
/// 2. effective keyword: notify, high
/// 3. direct question to the reader in the latest message: notify, medium
/// 4. latest message is trivial (short, acknowledgement, emoji only): skip
/// 5. batch touches a learned suppressed topic: skip
/// 6. otherwise inference is needed
pub fn classify(batch: &[ChatMessage], profile: &ClassifierProfile) -> Triage {
    let user_id = profile.identity.user_id.as_str();
    let Some(latest) = incoming(batch, user_id).last() else {
        return Triage::DefinitelySkip(Verdict::skip("no messages from other participants"));
    };

    if let Some(verdict) = notify_rules(batch, profile, RuleMode::Triage) {
        return Triage::DefinitelyNotify(verdict);
    }

    let trimmed = text::trim_noise(&latest.text);
    if text::is_emoji_only(trimmed) {
        return Triage::DefinitelySkip(Verdict::skip("latest message is emoji only"));
    }
    if trimmed.chars().count() < 3 {
        return Triage::DefinitelySkip(Verdict::skip("latest message is too short to act on"));
    }
    if text::is_acknowledgement(trimmed) {
        return Triage::DefinitelySkip(Verdict::skip("latest message is an acknowledgement"));
    }

    let topic = profile.suppressed_topics.iter().find(|topic| {
        incoming(batch, user_id).any(|m| text::contains_word(&m.text, topic))
    });
    if let Some(topic) = topic {
        return Triage::DefinitelySkip(Verdict::skip(format!(
            "conversation is about suppressed topic '{}'",
            topic
        )));
    }

    Triage::NeedsInference
}

/// Deterministic replacement for inference: rules 1 to 3 with keyword matches
/// at medium priority, otherwise do not notify. The reason is marked as
/// fallback-sourced.
pub fn fallback_verdict(batch: &[ChatMessage], profile: &ClassifierProfile) -> Verdict {
    notify_rules(batch, profile, RuleMode::Fallback)
        .unwrap_or_else(|| Verdict::skip("no mention, keyword or direct question"))
        .with_reason_prefix("fallback: ")
}
