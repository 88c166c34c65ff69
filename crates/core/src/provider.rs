//! Provider trait — the abstraction over text-generation backends.
//!
//! A Provider accepts the flattened prompt produced by the assembler and
//! returns generated text, either complete or as a stream of fragments.
//! Both implementations (local candle runtime, remote chat-completion API)
//! must behave identically from the caller's perspective.
//!
//! Streaming is pull-based: the caller drives the [`TokenStream`] receiver
//! and dropping it is the cancellation mechanism. Fragments arrive in
//! generation order, and their concatenation equals what a non-streaming
//! call would have returned for the same inputs (modulo sampling
//! non-determinism).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A lazy sequence of generated text fragments.
///
/// Each `recv` may block until the next fragment is available. No work
/// proceeds without an active pull once the channel's buffer is full, and
/// dropping the receiver stops the producer.
pub type TokenStream = tokio::sync::mpsc::Receiver<std::result::Result<String, ProviderError>>;

/// Parameters for a single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The flattened prompt (see `crate::prompt`).
    pub prompt: String,

    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0 = greedy).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling mass.
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Repetition penalty (1.0 = none).
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Stop sequences. The local runtime halts when one appears; the
    /// remote API has no equivalent mechanism for this format and relies
    /// on its own end-of-turn behavior instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
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

impl GenerationRequest {
    /// A request with default sampling parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            stop: Vec::new(),
        }
    }
}

/// The core Provider trait.
///
/// Selected by configuration at process start (factory in
/// `promptloom-providers`), never by runtime type inspection.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable backend name (e.g., "local", "remote").
    fn name(&self) -> &str;

    /// Prepare the backend: load model weights, verify credentials.
    /// Idempotent; a failure here is fatal at startup.
    async fn load(&self) -> std::result::Result<(), ProviderError>;

    /// Generate a complete response for the prompt.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<String, ProviderError>;

    /// Generate a response as a stream of text fragments.
    ///
    /// Default implementation calls `generate()` and yields the result as
    /// a single fragment.
    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<TokenStream, ProviderError> {
        let text = self.generate(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }

    /// Whether the backend is ready to serve requests.
    fn is_ready(&self) -> bool;
}
