//! HTTP embedder — batch text → vectors via an OpenAI-compatible
//! `/embeddings` endpoint.

use async_trait::async_trait;
use promptloom_core::{Embedder, RetrievalError};
use serde::Deserialize;
use tracing::debug;

/// An embedder backed by an OpenAI-compatible embeddings API.
pub struct HttpEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// Create a new HTTP embedder.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            client,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });

        debug!(model = %self.model, count = texts.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::EmbeddingFailed(format!(
                "endpoint returned {status}: {error_body}"
            )));
        }

        let api_resp: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(format!("unparseable response: {e}")))?;

        if api_resp.data.len() != texts.len() {
            return Err(RetrievalError::EmbeddingFailed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                api_resp.data.len()
            )));
        }

        // The API may return entries out of order; index is authoritative.
        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
