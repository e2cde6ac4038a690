//! hush-embeddings - Embedding providers for hush.
//!
//! Implementations of [`hush_core::Embedder`] used by context retrieval to
//! find history related to an unread batch.
//!
//! # Supported Providers
//!
//! - **OpenAI** (feature: `openai`) - text-embedding-3-small, text-embedding-3-large
//! - **Ollama** (feature: `ollama`) - local embedding models
//!
//! # Example
//!
//! ```ignore
//! use hush_embeddings::EmbedderFactory;
//!
//! let embedder = EmbedderFactory::openai()?;
//! let embedder = EmbedderFactory::ollama_with_model("nomic-embed-text", 768)?;
//! ```

mod factory;
mod ollama;
mod openai;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

// Re-export core types for convenience
pub use hush_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
