//! Parsing and validation of model output.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ErrorCode, HushError, HushResult};
use crate::types::{Priority, Verdict};

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid regex"));
static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Strip reasoning tags and code fences, then cut to the outermost JSON object.
pub fn extract_json(text: &str) -> String {
    let text = THINK_RE.replace_all(text.trim(), "");
    let text = text.trim();

    let inner = CODE_BLOCK_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str().trim());

    match (inner.find('{'), inner.rfind('}')) {
        (Some(start), Some(end)) if start < end => inner[start..=end].to_string(),
        _ => inner.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "shouldNotify")]
    should_notify: bool,
    reason: String,
    #[serde(default, alias = "notificationText")]
    notification_text: Option<String>,
    priority: String,
}

/// Parse and validate a decision. Fails when the output is not a JSON object
/// of the expected shape, the priority is unknown, or a positive decision has
/// no notification text.
pub fn parse_verdict(response: &str) -> HushResult<Verdict> {
    let json = extract_json(response);
    if json.is_empty() {
        return Err(HushError::invalid_llm_response("Empty response"));
    }

    let raw: RawVerdict = serde_json::from_str(&json).map_err(|e| HushError::Parse {
        message: format!("Failed to parse decision JSON: {}", e),
        code: ErrorCode::ParseInvalidJson,
    })?;

    let priority = Priority::from_str(raw.priority.trim()).map_err(|_| HushError::Parse {
        message: format!("Unknown priority '{}'", raw.priority),
        code: ErrorCode::ParseMissingField,
    })?;

    let text = raw
        .notification_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    if raw.should_notify {
        let text = text.ok_or_else(|| {
            HushError::invalid_llm_response("should_notify is true but notification_text is empty")
        })?;
        Ok(Verdict::notify(priority, raw.reason.trim(), text))
    } else {
        Ok(Verdict {
            priority,
            ..Verdict::skip(raw.reason.trim())
        })
    }
}
