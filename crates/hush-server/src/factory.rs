//! Builds a [`NotificationEngine`] from configuration.

use std::sync::Arc;

use hush_core::config::EngineConfig;
use hush_core::error::HushResult;
use hush_core::store::SqliteStore;
use hush_core::{EngineStores, NotificationEngine};
use hush_embeddings::EmbedderFactory;
use hush_llm::LlmFactory;
use tracing::info;

/// Open the database and wire providers, stores and transport into an engine.
pub fn create_engine(
    config: EngineConfig,
) -> HushResult<(Arc<NotificationEngine>, Arc<SqliteStore>)> {
    let llm = LlmFactory::from_config(&config.llm)?;
    let embedder = EmbedderFactory::from_config(&config.embedder)?;
    let transport = config.delivery.build_transport()?;

    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    info!(
        path = %config.database_path.display(),
        llm = llm.model_name(),
        embedder = embedder.model_name(),
        "Opened notification store"
    );

    let engine = NotificationEngine::new(
        config,
        llm,
        embedder,
        EngineStores::sqlite(store.clone()),
        transport,
    )?;
    Ok((Arc::new(engine), store))
}
