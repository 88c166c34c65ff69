//! Local inference provider — runs a GGUF model in-process.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML)
//! to run quantized llama-family models from a configured file path.
//! Weight acquisition is out of scope: the `.gguf` file and its
//! `tokenizer.json` sibling must already exist on disk.
//!
//! The flattened prompt is fed to the model verbatim — it already carries
//! the instruct-format delimiters — and generation halts on the model's
//! end-of-turn token or on any configured stop sequence.
//!
//! Streaming is genuine token-by-token: a blocking worker decodes after
//! every sampled token and pushes the new text through a bounded channel.
//! Dropping the receiver is the cancellation signal; the worker notices
//! the closed channel on its next send and stops sampling.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use candle_transformers::utils::apply_repeat_penalty;
use promptloom_core::{GenerationRequest, Provider, ProviderError, TokenStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Sampling seed. Fixed so that identical requests against an identical
/// model produce identical output, which is what makes the
/// streaming/non-streaming equivalence testable.
const SAMPLING_SEED: u64 = 42;

/// How many trailing tokens the repeat penalty looks back over.
const REPEAT_LAST_N: usize = 64;

/// A provider that runs a quantized GGUF model locally via Candle.
///
/// The model sits behind a Mutex because Candle CPU inference is
/// single-threaded; requests are serialized.
pub struct LocalProvider {
    model_path: PathBuf,
    context_window: usize,
    gpu_layers: usize,
    state: Arc<Mutex<Option<LocalModelState>>>,
    loaded: AtomicBool,
}

impl LocalProvider {
    /// Create a provider for the GGUF file at `model_path`. The model is
    /// loaded by `load()`, or lazily on the first request.
    pub fn new(model_path: impl Into<PathBuf>, context_window: usize, gpu_layers: usize) -> Self {
        Self {
            model_path: model_path.into(),
            context_window,
            gpu_layers,
            state: Arc::new(Mutex::new(None)),
            loaded: AtomicBool::new(false),
        }
    }

    /// Context window size, for the stats surface.
    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Accelerator layer count, for the stats surface.
    pub fn gpu_layers(&self) -> usize {
        self.gpu_layers
    }

    /// Load the model if it is not resident yet.
    async fn ensure_loaded(&self) -> Result<(), ProviderError> {
        {
            let state = self.state.lock().await;
            if state.is_some() {
                return Ok(());
            }
        }

        info!(path = %self.model_path.display(), "Loading local model");
        let path = self.model_path.clone();
        let loaded = tokio::task::spawn_blocking(move || LocalModelState::load(&path))
            .await
            .map_err(|e| ProviderError::ApiError {
                status_code: 500,
                message: format!("Model loading task failed: {e}"),
            })??;

        let mut state = self.state.lock().await;
        *state = Some(loaded);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The loaded model state (weights + tokenizer).
struct LocalModelState {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_id: u32,
}

impl LocalModelState {
    /// Load a GGUF model and its sibling `tokenizer.json`.
    fn load(path: &Path) -> Result<Self, ProviderError> {
        if !path.exists() {
            return Err(ProviderError::ModelNotFound(format!(
                "no model file at {}",
                path.display()
            )));
        }

        let device = Device::Cpu;

        let mut file = std::fs::File::open(path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to open GGUF file: {e}")))?;

        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to parse GGUF file: {e}")))?;

        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(|e| {
            ProviderError::NotConfigured(format!("Failed to load model weights: {e}"))
        })?;

        let tokenizer_path = path.with_file_name("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(ProviderError::NotConfigured(format!(
                "no tokenizer.json next to {}",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;

        let eos_token_id = tokenizer
            .token_to_id("<|eot_id|>")
            .or_else(|| tokenizer.token_to_id("</s>"))
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .or_else(|| tokenizer.token_to_id("<|im_end|>"))
            .unwrap_or(2); // fallback to common EOS id

        info!(eos_token_id, "Local model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token_id,
        })
    }

    /// Run generation, calling `emit` with each new text fragment.
    ///
    /// Returns the full generated text, which always equals the
    /// concatenation of emitted fragments. `emit` returning false means
    /// the consumer went away; generation stops there.
    fn generate_with<F: FnMut(&str) -> bool>(
        &mut self,
        request: &GenerationRequest,
        mut emit: F,
    ) -> Result<String, ProviderError> {
        let encoding = self
            .tokenizer
            .encode(request.prompt.as_str(), true)
            .map_err(|e| ProviderError::ApiError {
                status_code: 500,
                message: format!("Tokenization failed: {e}"),
            })?;
        let prompt_tokens = encoding.get_ids().to_vec();

        debug!(
            prompt_tokens = prompt_tokens.len(),
            max_tokens = request.max_tokens,
            temperature = request.temperature,
            "Starting local generation"
        );

        let mut logits_processor = if request.temperature <= 0.0 {
            LogitsProcessor::new(SAMPLING_SEED, None, None)
        } else {
            LogitsProcessor::new(
                SAMPLING_SEED,
                Some(request.temperature as f64),
                Some(request.top_p as f64),
            )
        };

        // Prompt pass
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let logits = self
            .model
            .forward(&input, 0)
            .and_then(|l| l.squeeze(0))
            .map_err(map_candle_err)?;
        let mut next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;

        let mut generated: Vec<u32> = Vec::new();
        let mut text = String::new();
        let mut emitted = 0usize; // byte offset into `text` already emitted

        for step in 0..request.max_tokens as usize {
            if next_token == self.eos_token_id {
                break;
            }
            generated.push(next_token);

            // Re-decode the whole generated sequence and emit the suffix.
            // Decoding token-by-token would split multi-byte merges.
            let full = self
                .tokenizer
                .decode(&generated, true)
                .map_err(|e| ProviderError::ApiError {
                    status_code: 500,
                    message: format!("Detokenization failed: {e}"),
                })?;

            if let Some(stop_at) = find_stop(&full, &request.stop) {
                if stop_at > emitted && !emit(&full[emitted..stop_at]) {
                    return Ok(full[..stop_at].to_string());
                }
                text = full[..stop_at].to_string();
                return Ok(text);
            }

            if full.len() > emitted && full.is_char_boundary(emitted) {
                if !emit(&full[emitted..]) {
                    return Ok(full);
                }
                emitted = full.len();
            }
            text = full;

            // Next-token pass
            let input = Tensor::new(&[next_token][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
            let logits = self
                .model
                .forward(&input, prompt_tokens.len() + step)
                .and_then(|l| l.squeeze(0))
                .map_err(map_candle_err)?;

            let logits = if (request.repeat_penalty - 1.0).abs() < f32::EPSILON {
                logits
            } else {
                let lookback = generated.len().saturating_sub(REPEAT_LAST_N);
                apply_repeat_penalty(&logits, request.repeat_penalty, &generated[lookback..])
                    .map_err(map_candle_err)?
            };

            next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;
        }

        // Flush any tail held back by a char-boundary check, so the
        // emitted fragments always concatenate to the returned text.
        if text.len() > emitted {
            let _ = emit(&text[emitted..]);
        }

        debug!(
            completion_tokens = generated.len(),
            output_len = text.len(),
            "Generation complete"
        );

        Ok(text)
    }
}

/// First position at which any stop sequence occurs, if one does.
fn find_stop(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Map Candle errors to ProviderError.
fn map_candle_err(e: candle_core::Error) -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message: format!("Candle inference error: {e}"),
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn load(&self) -> Result<(), ProviderError> {
        self.ensure_loaded().await
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        self.ensure_loaded().await?;

        let state = self.state.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = state.blocking_lock();
            let model = guard
                .as_mut()
                .ok_or_else(|| ProviderError::NotConfigured("model not loaded".into()))?;
            model.generate_with(&request, |_| true)
        })
        .await
        .map_err(|e| ProviderError::ApiError {
            status_code: 500,
            message: format!("Inference task panicked: {e}"),
        })?
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError> {
        self.ensure_loaded().await?;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let state = self.state.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = state.blocking_lock();
            let model = match guard.as_mut() {
                Some(m) => m,
                None => {
                    let _ = tx.blocking_send(Err(ProviderError::NotConfigured(
                        "model not loaded".into(),
                    )));
                    return;
                }
            };

            let result =
                model.generate_with(&request, |fragment| {
                    tx.blocking_send(Ok(fragment.to_string())).is_ok()
                });

            if let Err(e) = result {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(rx)
    }

    fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}
