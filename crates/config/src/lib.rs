//! Configuration loading, validation, and management for Promptloom.
//!
//! Loads configuration from `~/.promptloom/config.toml` with environment
//! variable overrides. Validates all settings at startup: a missing remote
//! credential or an unknown backend selector aborts the process before any
//! request is served, it never degrades silently.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which generation backend to use: "local" or "remote".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// How many of the most recent conversation turns are encoded into the
    /// prompt. Older turns are silently dropped, never summarized.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Local (in-process) backend settings.
    #[serde(default)]
    pub local: LocalConfig,

    /// Remote chat-completion backend settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Retrieval pipeline settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Default sampling parameters for generation.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Persona settings.
    #[serde(default)]
    pub persona: PersonaConfig,
}

fn default_backend() -> String {
    "local".into()
}
fn default_history_limit() -> usize {
    10
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("backend", &self.backend)
            .field("history_limit", &self.history_limit)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("retrieval", &self.retrieval)
            .field("generation", &self.generation)
            .field("persona", &self.persona)
            .finish()
    }
}

/// Settings for the in-process candle backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Path to a GGUF model file. Weight download is out of scope; the
    /// file must already exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,

    /// Context window size reported to callers.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Accelerator layer count reported to callers (0 = CPU only).
    #[serde(default)]
    pub gpu_layers: usize,
}

fn default_context_window() -> usize {
    4096
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            context_window: default_context_window(),
            gpu_layers: 0,
        }
    }
}

/// Settings for the remote chat-completion backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API key. Required when `backend = "remote"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint.
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,

    /// Model name sent with each request.
    #[serde(default = "default_remote_model")]
    pub model: String,
}

fn default_remote_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_remote_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_remote_base_url(),
            model: default_remote_model(),
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Settings for the retrieval pipeline.
#[derive(Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Whether retrieval context is assembled into prompts at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible `/embeddings` endpoint.
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// API key for the embedding endpoint (falls back to the remote key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_api_key: Option<String>,

    /// Embedding vector dimension.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Chunk window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Passages fetched per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_true() -> bool {
    true
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimension() -> usize {
    1536
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_api_key: None,
            embedding_dimension: default_embedding_dimension(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

impl std::fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("enabled", &self.enabled)
            .field("embedding_url", &self.embedding_url)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_api_key", &redact(&self.embedding_api_key))
            .field("embedding_dimension", &self.embedding_dimension)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("top_k", &self.top_k)
            .finish()
    }
}

/// Default sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
}

fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_repeat_penalty() -> f32 {
    1.1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
        }
    }
}

/// Persona settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Override the built-in base persona text entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.promptloom/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `PROMPTLOOM_API_KEY` — remote API key
    /// - `PROMPTLOOM_BACKEND` — backend selector
    /// - `PROMPTLOOM_MODEL` — remote model name
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var("PROMPTLOOM_API_KEY") {
            config.remote.api_key = Some(key);
        }
        if let Ok(backend) = std::env::var("PROMPTLOOM_BACKEND") {
            config.backend = backend;
        }
        if let Ok(model) = std::env::var("PROMPTLOOM_MODEL") {
            config.remote.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptloom")
    }

    /// Validate the configuration. Called after env overrides are applied
    /// so that `PROMPTLOOM_BACKEND=typo` fails just as loudly as a typo in
    /// the config file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.as_str() {
            "local" | "remote" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown backend '{other}' (expected \"local\" or \"remote\")"
                )));
            }
        }

        if self.backend == "remote" && self.remote.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::ValidationError(
                "backend \"remote\" requires remote.api_key or PROMPTLOOM_API_KEY".into(),
            ));
        }

        if self.backend == "local" && self.local.model_path.is_none() {
            return Err(ConfigError::ValidationError(
                "backend \"local\" requires local.model_path".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than retrieval.chunk_size".into(),
            ));
        }

        if self.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "history_limit must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            history_limit: default_history_limit(),
            local: LocalConfig::default(),
            remote: RemoteConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            persona: PersonaConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for promptloom_core::Error {
    fn from(err: ConfigError) -> Self {
        promptloom_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_shape() {
        let config = AppConfig::default();
        assert_eq!(config.backend, "local");
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert_eq!(config.retrieval.chunk_overlap, 200);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.backend, config.backend);
        assert_eq!(parsed.history_limit, config.history_limit);
    }

    #[test]
    fn unknown_backend_rejected() {
        let config = AppConfig {
            backend: "quantum".into(),
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quantum"));
    }

    #[test]
    fn remote_backend_requires_api_key() {
        let config = AppConfig {
            backend: "remote".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            backend: "remote".into(),
            remote: RemoteConfig {
                api_key: Some("sk-test".into()),
                ..RemoteConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn local_backend_requires_model_path() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let config = AppConfig {
            local: LocalConfig {
                model_path: Some("/models/assistant.gguf".into()),
                ..LocalConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = AppConfig {
            local: LocalConfig {
                model_path: Some("/models/assistant.gguf".into()),
                ..LocalConfig::default()
            },
            retrieval: RetrievalConfig {
                chunk_size: 100,
                chunk_overlap: 100,
                ..RetrievalConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().backend, "local");
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = [this is not toml").unwrap();
        let result = AppConfig::load_from(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn config_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
backend = "remote"
history_limit = 6

[remote]
api_key = "sk-test"
model = "gpt-4o"

[retrieval]
chunk_size = 800
chunk_overlap = 120
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.backend, "remote");
        assert_eq!(config.history_limit, 6);
        assert_eq!(config.remote.model, "gpt-4o");
        assert_eq!(config.retrieval.chunk_size, 800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            remote: RemoteConfig {
                api_key: Some("sk-secret".into()),
                ..RemoteConfig::default()
            },
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("backend"));
        assert!(toml_str.contains("chunk_size"));
    }
}
