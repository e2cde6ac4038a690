//! Notification transports.
//!
//! - [`LoggingTransport`] records notifications through `tracing` only
//! - [`WebhookTransport`] POSTs them to an HTTP endpoint with an HMAC-SHA256
//!   signature and exponential backoff on transient failures

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::{HushError, HushResult};
use crate::traits::{NotificationTransport, OutboundNotification};

/// Transport that only logs.
#[derive(Debug, Default, Clone)]
pub struct LoggingTransport;

#[async_trait]
impl NotificationTransport for LoggingTransport {
    async fn deliver(&self, notification: &OutboundNotification) -> HushResult<()> {
        info!(
            user_id = %notification.user_id,
            conversation_id = %notification.deep_link_conversation_id,
            decision_id = %notification.decision_id,
            priority = %notification.priority,
            presentation = %notification.presentation,
            title = %notification.title,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0_f32,
        }
    }
}

/// Webhook endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTransportConfig {
    pub url: String,
    /// Secret for HMAC signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl WebhookTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
            retry_policy: RetryPolicy::default(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

#[derive(Debug)]
enum AttemptError {
    /// 5xx or network failure; retried.
    Transient(String),
    /// 4xx; not retried.
    Permanent(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient: {}", msg),
            Self::Permanent(msg) => write!(f, "permanent: {}", msg),
        }
    }
}

/// Transport that POSTs JSON notifications to a webhook.
#[derive(Clone)]
pub struct WebhookTransport {
    client: Client,
    config: WebhookTransportConfig,
}

impl WebhookTransport {
    pub fn new(config: WebhookTransportConfig) -> HushResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HushError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WebhookTransportConfig {
        &self.config
    }

    /// `sha256=<hex>` HMAC of the payload, or an empty string without a secret.
    fn sign_payload(&self, payload: &str) -> HushResult<String> {
        match &self.config.secret {
            Some(secret) => sign(payload, secret),
            None => Ok(String::new()),
        }
    }
}

fn sign(payload: &str, secret: &str) -> HushResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| HushError::Configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a webhook signature. For receivers of [`WebhookTransport`] payloads.
pub fn verify_signature(payload: &str, secret: &str, signature: &str) -> bool {
    let Ok(expected) = sign(payload, secret) else {
        return false;
    };

    // Constant-time comparison
    let (a, b) = (expected.as_bytes(), signature.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn deliver(&self, notification: &OutboundNotification) -> HushResult<()> {
        let payload = serde_json::to_string(notification)?;
        let signature = self.sign_payload(&payload)?;

        let deliver_once = || async {
            let response = self
                .client
                .post(&self.config.url)
                .header("Content-Type", "application/json")
                .header("X-Hush-Signature", &signature)
                .header("X-Hush-Decision", &notification.decision_id)
                .body(payload.clone())
                .send()
                .await
                .map_err(|e| AttemptError::Transient(format!("Network error: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else if status.is_server_error() {
                Err(AttemptError::Transient(format!("Server error: {}", status)))
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(AttemptError::Permanent(format!("Client error {}: {}", status, body)))
            }
        };

        let policy = &self.config.retry_policy;
        deliver_once
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(policy.max_retries as usize)
                    .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
                    .with_max_delay(Duration::from_millis(policy.max_delay_ms))
                    .with_factor(policy.multiplier),
            )
            .when(|e| matches!(e, AttemptError::Transient(_)))
            .notify(|err, dur| {
                warn!(
                    url = %self.config.url,
                    decision_id = %notification.decision_id,
                    retry_in_ms = dur.as_millis() as u64,
                    error = %err,
                    "Webhook delivery failed, retrying"
                );
            })
            .await
            .map_err(|e| HushError::transport(format!("Webhook delivery to {} failed: {}", self.config.url, e)))
    }
}
