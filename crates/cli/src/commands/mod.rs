//! CLI command implementations.

pub mod chat;
pub mod check;
pub mod stats;

use std::sync::Arc;

use promptloom_config::AppConfig;
use promptloom_engine::{ChatEngine, LocalRuntimeInfo, Persona, PromptAssembler};
use promptloom_retrieval::{Chunker, HttpEmbedder, MemoryIndex, RetrievalStore};

/// Build the retrieval store from config, when retrieval is enabled.
pub(crate) fn build_store(config: &AppConfig) -> Option<Arc<RetrievalStore>> {
    if !config.retrieval.enabled {
        return None;
    }

    let api_key = config
        .retrieval
        .embedding_api_key
        .clone()
        .or_else(|| config.remote.api_key.clone())
        .unwrap_or_default();

    let embedder = Arc::new(HttpEmbedder::new(
        &config.retrieval.embedding_url,
        api_key,
        &config.retrieval.embedding_model,
        config.retrieval.embedding_dimension,
    ));

    Some(Arc::new(RetrievalStore::new(
        embedder,
        Arc::new(MemoryIndex::new()),
        Chunker::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap),
        config.retrieval.top_k,
    )))
}

/// Wire provider, assembler, and store into a ChatEngine.
pub(crate) fn build_engine(
    config: &AppConfig,
    store: Option<Arc<RetrievalStore>>,
) -> anyhow::Result<ChatEngine> {
    let provider = promptloom_providers::build_provider(config)?;

    let persona = Persona::from_override(config.persona.system_prompt_override.as_deref());
    let mut assembler = PromptAssembler::new(persona, config.history_limit);
    if let Some(store) = &store {
        assembler = assembler.with_store(store.clone());
    }

    let mut engine = ChatEngine::new(provider, assembler, config.generation.clone());
    if let Some(store) = store {
        engine = engine.with_store(store);
    }
    if config.backend == "local" {
        engine = engine.with_local_info(LocalRuntimeInfo {
            context_window: config.local.context_window,
            gpu_layers: config.local.gpu_layers,
        });
    }

    Ok(engine)
}
