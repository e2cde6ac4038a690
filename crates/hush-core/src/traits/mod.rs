//! Core traits for hush collaborators and providers.

mod embedder;
mod llm;
mod stores;
mod transport;

pub use embedder::*;
pub use llm::*;
pub use stores::*;
pub use transport::*;
