//! Remote provider — OpenAI-compatible chat completions.
//!
//! The remote API wants a role-tagged message array, not the flattened
//! prompt, so every request first runs through the translator
//! (`crate::translate`). Two parameter mismatches are handled here:
//!
//! - The configured repeat penalty maps linearly onto the API's
//!   `frequency_penalty` (`penalty - 1.0`).
//! - Stop sequences from the flattened format are delimiter tokens that
//!   mean nothing to the remote API and are intentionally not forwarded;
//!   the API's own end-of-turn behavior terminates generation instead.
//!
//! Supports non-streaming and streaming (SSE) generation.

use async_trait::async_trait;
use futures::StreamExt;
use promptloom_core::{GenerationRequest, Provider, ProviderError, TokenStream};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::translate;

/// A provider backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct RemoteProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl RemoteProvider {
    /// Create a new remote provider.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Build the request body: translate the flattened prompt into a
    /// message array and map the sampling parameters.
    fn request_body(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<ApiMessage> = translate::unflatten(&request.prompt)
            .into_iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content),
            })
            .collect();

        // `request.stop` is deliberately absent here.
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
            "frequency_penalty": request.repeat_penalty - 1.0,
            "stream": stream,
        })
    }

    /// Map a non-200 status to the matching provider error.
    fn status_error(status: u16, error_body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            _ => {
                warn!(status, body = %error_body, "Remote API returned error");
                ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                }
            }
        }
    }
}

#[async_trait]
impl Provider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    async fn load(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "remote backend requires an API key".into(),
            ));
        }

        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "API key rejected by remote endpoint".into(),
            ));
        }

        debug!(status, "Remote provider reachable");
        Ok(())
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request, false);

        debug!(model = %self.model, prompt_len = request.prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        choice.message.content.ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No content in response message".into(),
        })
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request, true);

        debug!(model = %self.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward content deltas. The task
        // ends when the stream does or when the receiver is dropped.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();

                        if data == "[DONE]" {
                            return;
                        }

                        match serde_json::from_str::<StreamResponse>(data) {
                            Ok(stream_resp) => {
                                if let Some(choice) = stream_resp.choices.first() {
                                    if let Some(content) = &choice.delta.content {
                                        if !content.is_empty()
                                            && tx.send(Ok(content.clone())).await.is_err()
                                        {
                                            return; // receiver dropped
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// --- Chat-completion API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
