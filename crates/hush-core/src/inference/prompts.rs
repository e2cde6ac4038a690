//! Prompts for the notification decision call.

use crate::classifier::text::excerpt;
use crate::retrieval::NotificationContext;
use crate::types::Message;

/// Longest message text rendered into the prompt.
const PROMPT_MESSAGE_CHARS: usize = 500;
/// Own-activity lines rendered into the prompt.
const PROMPT_ACTIVITY_LINES: usize = 20;

pub const DECISION_SYSTEM_PROMPT: &str = r#"You decide whether a batch of unread chat messages deserves an interruptive push notification for one reader.

Notify when the messages need the reader's attention soon: they are addressed to the reader, ask the reader something, concern commitments or topics the reader is actively involved in, or match the reader's priority keywords. Do not notify for small talk, acknowledgements, reactions, or chatter the reader is not part of.

Respond with a single JSON object and nothing else:
{"should_notify": true|false, "reason": "<short explanation>", "notification_text": "<one-sentence summary for the notification, or null when should_notify is false>", "priority": "high"|"medium"|"low"}

Rules:
- "priority" is "high" only for urgent or directly addressed requests, "medium" for relevant messages, "low" otherwise.
- When should_notify is false, notification_text must be null.
- When should_notify is true, notification_text must be a non-empty summary of what the reader needs to know. Do not include the reader's name."#;

pub const STRICT_FORMAT_REMINDER: &str = "Your previous answer could not be parsed. Reply with ONLY the JSON object described above: no prose, no markdown, no code fences. All four fields are required and priority must be one of \"high\", \"medium\", \"low\".";

fn render_line(sender: &str, text: &str) -> String {
    format!("- {}: {}", sender, excerpt(text, PROMPT_MESSAGE_CHARS).replace('\n', " "))
}

/// Render the context as the user turn of the decision call.
pub fn render_context(context: &NotificationContext) -> String {
    let mut out = String::new();
    let identity = &context.identity;

    out.push_str(&format!(
        "Reader: {} (handle @{})\n",
        identity.display_name, identity.handle
    ));

    let keywords = context.classifier_profile().keywords;
    if !keywords.is_empty() {
        out.push_str(&format!("Priority keywords: {}\n", keywords.join(", ")));
    }
    if let Some(profile) = &context.profile {
        if !profile.suppressed_topics.is_empty() {
            let topics: Vec<&str> = profile.suppressed_topics.iter().map(String::as_str).collect();
            out.push_str(&format!(
                "Topics the reader found not worth a notification: {}\n",
                topics.join(", ")
            ));
        }
        out.push_str(match profile.preferred_notification_rate {
            crate::types::NotificationRate::More => "Reader prefers more notifications than today.\n",
            crate::types::NotificationRate::Same => "Reader prefers about as many notifications as today.\n",
            crate::types::NotificationRate::Fewer => "Reader prefers fewer notifications than today.\n",
        });
    }

    out.push_str("\nUnread messages (oldest first):\n");
    for message in &context.unread {
        out.push_str(&render_line(&message.sender_name, &message.text));
        out.push('\n');
    }

    if !context.related_history.is_empty() {
        out.push_str("\nRelated earlier messages:\n");
        for related in &context.related_history {
            out.push_str(&render_line(&related.message.sender_name, &related.message.text));
            out.push('\n');
        }
    }

    if !context.recent_activity.is_empty() {
        out.push_str("\nWhat the reader wrote recently (newest first):\n");
        for message in context.recent_activity.iter().take(PROMPT_ACTIVITY_LINES) {
            out.push_str(&render_line("reader", &message.text));
            out.push('\n');
        }
    }

    out
}

/// Build the prompt. `strict` adds the formatting reminder used on retry.
pub fn build_messages(context: &NotificationContext, strict: bool) -> Vec<Message> {
    let mut messages = vec![
        Message::system(DECISION_SYSTEM_PROMPT),
        Message::user(render_context(context)),
    ];
    if strict {
        messages.push(Message::user(STRICT_FORMAT_REMINDER));
    }
    messages
}
