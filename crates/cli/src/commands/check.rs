//! `promptloom check` — Validate configuration and backend readiness.

use promptloom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("Promptloom Check");
    println!("================");
    println!("  Config file: {}", config_path.display());

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  Config:      ok");
            config
        }
        Err(e) => {
            println!("  Config:      FAILED — {e}");
            return Err(e.into());
        }
    };

    println!("  Backend:     {}", config.backend);

    let store = super::build_store(&config);
    if let Some(store) = &store {
        match store.initialize().await {
            Ok(()) => println!("  Retrieval:   ok"),
            Err(e) => println!("  Retrieval:   FAILED — {e}"),
        }
    } else {
        println!("  Retrieval:   disabled");
    }

    let engine = super::build_engine(&config, store)?;
    match engine.load().await {
        Ok(()) => println!("  Provider:    ready"),
        Err(e) => {
            println!("  Provider:    FAILED — {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
