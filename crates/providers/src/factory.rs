//! Provider factory — selects the generation backend from configuration.
//!
//! Backend selection happens exactly once, at process start. An unknown
//! selector or missing credentials is a configuration error that aborts
//! startup; it never degrades to a default backend silently.

use promptloom_config::AppConfig;
use promptloom_core::{Error, Provider};
use std::sync::Arc;
use tracing::info;

use crate::remote::RemoteProvider;

/// Build the configured provider.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Error> {
    match config.backend.as_str() {
        "remote" => {
            let api_key = config.remote.api_key.clone().unwrap_or_default();
            if api_key.is_empty() {
                return Err(Error::Config {
                    message: "backend \"remote\" requires remote.api_key or PROMPTLOOM_API_KEY"
                        .into(),
                });
            }
            info!(model = %config.remote.model, "Using remote backend");
            Ok(Arc::new(RemoteProvider::new(
                &config.remote.base_url,
                api_key,
                &config.remote.model,
            )))
        }

        #[cfg(feature = "local")]
        "local" => {
            let model_path = config.local.model_path.as_deref().ok_or_else(|| Error::Config {
                message: "backend \"local\" requires local.model_path".into(),
            })?;
            info!(path = model_path, "Using local backend");
            Ok(Arc::new(crate::local::LocalProvider::new(
                model_path,
                config.local.context_window,
                config.local.gpu_layers,
            )))
        }

        #[cfg(not(feature = "local"))]
        "local" => Err(Error::Config {
            message: "backend \"local\" requires the \"local\" cargo feature".into(),
        }),

        other => Err(Error::Config {
            message: format!("unknown backend '{other}' (expected \"local\" or \"remote\")"),
        }),
    }
}
