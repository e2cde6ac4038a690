//! hush-llm - Inference backends for hush.
//!
//! Implementations of [`hush_core::Llm`] used by the notification engine to
//! decide on ambiguous batches.
//!
//! # Supported Providers
//!
//! - **OpenAI** (feature: `openai`) - chat completions with JSON mode
//! - **Anthropic** - Messages API over plain HTTP
//! - **Ollama** (feature: `ollama`) - local models
//!
//! # Example
//!
//! ```ignore
//! use hush_llm::LlmFactory;
//!
//! let llm = LlmFactory::openai()?;
//! let llm = LlmFactory::anthropic_with_model("claude-3-5-haiku-20241022")?;
//! ```

mod anthropic;
mod factory;
mod ollama;
mod openai;

pub use anthropic::AnthropicLlm;
pub use factory::LlmFactory;
pub use ollama::OllamaLlm;
pub use openai::OpenAIProvider;

// Re-export core types for convenience
pub use hush_core::config::LlmProvider;
pub use hush_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat};
