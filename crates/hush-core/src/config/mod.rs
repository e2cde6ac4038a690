//! Configuration system for hush.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::activity::ActivityConfig;
use crate::cache::CacheConfig;
use crate::delivery::DeliveryConfig;
use crate::error::{HushError, HushResult};
use crate::inference::InferenceConfig;
use crate::learner::LearnerConfig;
use crate::retrieval::RetrievalConfig;
use crate::traits::{EmbedderConfig, EmbedderProvider, LlmConfig};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    Anthropic,
    Ollama,
}

/// Provider configuration with type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type.
    pub provider: LlmProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: LlmConfig,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            config: LlmConfig {
                model: "gpt-4.1-nano-2025-04-14".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Embedder provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbedderProviderConfig {
    /// Provider type.
    pub provider: EmbedderProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: EmbedderConfig,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub activity: ActivityConfig,
    pub retrieval: RetrievalConfig,
    pub inference: InferenceConfig,
    pub cache: CacheConfig,
    pub delivery: DeliveryConfig,
    pub learner: LearnerConfig,
    pub llm: LlmProviderConfig,
    pub embedder: EmbedderProviderConfig,
    /// Path to the SQLite database holding preferences, decisions and feedback.
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let hush_dir = dirs::home_dir()
            .map(|h| h.join(".hush"))
            .unwrap_or_else(|| PathBuf::from(".hush"));

        Self {
            activity: ActivityConfig::default(),
            retrieval: RetrievalConfig::default(),
            inference: InferenceConfig::default(),
            cache: CacheConfig::default(),
            delivery: DeliveryConfig::default(),
            learner: LearnerConfig::default(),
            llm: LlmProviderConfig::default(),
            embedder: EmbedderProviderConfig::default(),
            database_path: hush_dir.join("hush.db"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> HushResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| HushError::Configuration(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| HushError::Configuration(e.to_string()))
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| HushError::Configuration(e.to_string()))
            }
            _ => Err(HushError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Providers
        if let Ok(provider) = std::env::var("HUSH_LLM_PROVIDER") {
            config.llm.provider = match provider.to_lowercase().as_str() {
                "anthropic" => LlmProvider::Anthropic,
                "ollama" => LlmProvider::Ollama,
                _ => LlmProvider::OpenAI,
            };
        }
        if let Ok(model) = std::env::var("HUSH_LLM_MODEL") {
            config.llm.config.model = model;
        }
        if let Ok(url) = std::env::var("HUSH_LLM_BASE_URL") {
            config.llm.config.base_url = Some(url);
        }
        if let Ok(provider) = std::env::var("HUSH_EMBEDDER_PROVIDER") {
            config.embedder.provider = match provider.to_lowercase().as_str() {
                "ollama" => EmbedderProvider::Ollama,
                _ => EmbedderProvider::OpenAI,
            };
        }
        if let Ok(model) = std::env::var("HUSH_EMBEDDER_MODEL") {
            config.embedder.config.model = model;
        }
        if let Some(dims) = env_parse("HUSH_EMBEDDER_DIMS") {
            config.embedder.config.embedding_dims = dims;
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            if config.llm.provider == LlmProvider::OpenAI {
                config.llm.config.api_key = Some(api_key.clone());
            }
            config.embedder.config.api_key = Some(api_key);
        }
        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            if config.llm.provider == LlmProvider::Anthropic {
                config.llm.config.api_key = Some(api_key);
            }
        }

        // Activity
        if let Some(v) = env_parse("HUSH_PAUSE_THRESHOLD_SECS") {
            config.activity.pause_threshold_secs = v;
        }
        if let Some(v) = env_parse("HUSH_MESSAGE_COUNT_THRESHOLD") {
            config.activity.message_count_threshold = v;
        }
        if let Some(v) = env_parse("HUSH_DEBOUNCE_SECS") {
            config.activity.debounce_secs = v;
        }

        // Retrieval and inference
        if let Some(v) = env_parse("HUSH_TOP_K") {
            config.retrieval.top_k = v;
        }
        if let Some(v) = env_parse("HUSH_RETRIEVAL_TIMEOUT_SECS") {
            config.retrieval.timeout_secs = v;
        }
        if let Some(v) = env_parse("HUSH_INFERENCE_TIMEOUT_SECS") {
            config.inference.timeout_secs = v;
        }

        // Cache
        if let Some(v) = env_parse("HUSH_CACHE_TTL_HOURS") {
            config.cache.ttl_hours = v;
        }

        // Delivery
        if let Ok(url) = std::env::var("HUSH_WEBHOOK_URL") {
            let mut webhook = crate::delivery::WebhookTransportConfig::new(url);
            if let Ok(secret) = std::env::var("HUSH_WEBHOOK_SECRET") {
                webhook = webhook.with_secret(secret);
            }
            config.delivery.webhook = Some(webhook);
        }

        // Learner
        if let Ok(cron) = std::env::var("HUSH_LEARNER_CRON") {
            config.learner.cron = cron;
        }

        if let Ok(path) = std::env::var("HUSH_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        config
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn activity(mut self, config: ActivityConfig) -> Self {
        self.config.activity = config;
        self
    }

    pub fn retrieval(mut self, config: RetrievalConfig) -> Self {
        self.config.retrieval = config;
        self
    }

    pub fn inference(mut self, config: InferenceConfig) -> Self {
        self.config.inference = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    pub fn delivery(mut self, config: DeliveryConfig) -> Self {
        self.config.delivery = config;
        self
    }

    pub fn learner(mut self, config: LearnerConfig) -> Self {
        self.config.learner = config;
        self
    }

    /// Set LLM configuration.
    pub fn llm(mut self, config: LlmProviderConfig) -> Self {
        self.config.llm = config;
        self
    }

    /// Set embedder configuration.
    pub fn embedder(mut self, config: EmbedderProviderConfig) -> Self {
        self.config.embedder = config;
        self
    }

    /// Set database path.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
