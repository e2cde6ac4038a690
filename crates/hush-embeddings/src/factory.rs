//! Factory for creating embedding providers.

use std::sync::Arc;

use hush_core::config::EmbedderProviderConfig;
use hush_core::error::HushResult;
use hush_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
use tracing::debug;

use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAIEmbedder;

/// Factory for creating embedding providers.
pub struct EmbedderFactory;

impl EmbedderFactory {
    /// Create an embedder from the given configuration.
    pub fn create(provider: EmbedderProvider, config: EmbedderConfig) -> HushResult<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match provider {
            EmbedderProvider::OpenAI => Arc::new(OpenAIEmbedder::new(config)?),
            EmbedderProvider::Ollama => Arc::new(OllamaEmbedder::new(config)?),
        };
        debug!(
            provider = ?provider,
            model = embedder.model_name(),
            dims = embedder.dimension(),
            "Created embedder"
        );
        Ok(embedder)
    }

    /// Create the embedder described by an engine configuration section.
    pub fn from_config(config: &EmbedderProviderConfig) -> HushResult<Arc<dyn Embedder>> {
        Self::create(config.provider, config.config.clone())
    }

    /// Create an OpenAI embedder with default configuration.
    pub fn openai() -> HushResult<Arc<dyn Embedder>> {
        Self::create(EmbedderProvider::OpenAI, EmbedderConfig::default())
    }

    /// Create an OpenAI embedder with a specific model.
    pub fn openai_with_model(model: impl Into<String>, dims: usize) -> HushResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            ..Default::default()
        };
        Self::create(EmbedderProvider::OpenAI, config)
    }

    /// Create an Ollama embedder with default configuration.
    pub fn ollama() -> HushResult<Arc<dyn Embedder>> {
        Self::ollama_with_model("nomic-embed-text", 768)
    }

    /// Create an Ollama embedder with a specific model.
    pub fn ollama_with_model(model: impl Into<String>, dims: usize) -> HushResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            ..Default::default()
        };
        Self::create(EmbedderProvider::Ollama, config)
    }
}
