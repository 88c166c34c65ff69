//! `promptloom stats` — Show engine and index stats.

use promptloom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let store = super::build_store(&config);
    let engine = super::build_engine(&config, store)?;
    let stats = engine.stats().await;

    println!("Promptloom Stats");
    println!("================");
    println!("  Backend:        {}", stats.backend);
    println!("  History limit:  {} turns", stats.history_limit);
    if let Some(ctx) = stats.context_window {
        println!("  Context window: {ctx} tokens");
    }
    if let Some(layers) = stats.gpu_layers {
        println!("  GPU layers:     {layers}");
    }
    match (stats.indexed_chunks, stats.indexed_documents) {
        (Some(chunks), Some(docs)) => {
            println!("  Index:          {chunks} chunks from {docs} documents");
        }
        _ => println!("  Index:          retrieval disabled"),
    }

    Ok(())
}
