//! The chat engine — the surface callers talk to.
//!
//! Wires the assembler and the configured provider together:
//! `chat` for a complete reply, `chat_stream` for a tagged event stream,
//! `stats` for operational introspection. A failed request never corrupts
//! the engine for subsequent calls — the provider and store are shared
//! immutably and every request builds its own state.

use std::sync::Arc;

use promptloom_config::GenerationConfig;
use promptloom_core::prompt::TURN_END;
use promptloom_core::{
    AgentIntelligence, ConversationTurn, GenerationRequest, IdentityCandidate, Provider, Result,
    UserContext,
};
use promptloom_retrieval::RetrievalStore;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assembler::{AssembledPrompt, AssemblyInput, PromptAssembler, PromptDebug};
use crate::persona::PersonaMode;
use crate::stream_event::ChatStreamEvent;

/// One chat call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The current user message.
    pub message: String,

    /// Prior turns, oldest first. The engine reads a bounded window.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,

    /// Structured user facts, when known.
    #[serde(default)]
    pub user_context: Option<UserContext>,

    /// Candidate identity matches for an unverified visitor.
    #[serde(default)]
    pub candidates: Vec<IdentityCandidate>,

    /// Recently viewed pages.
    #[serde(default)]
    pub page_views: Vec<String>,

    /// Third-party agent enrichment.
    #[serde(default)]
    pub agent_data: Option<AgentIntelligence>,

    /// Persona variant.
    #[serde(default)]
    pub mode: PersonaMode,

    /// Capture an assembly debug trace.
    #[serde(default)]
    pub debug: bool,
}

impl ChatRequest {
    /// A plain request with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    fn assembly_input(&self) -> AssemblyInput<'_> {
        AssemblyInput {
            user_message: &self.message,
            history: &self.history,
            user_context: self.user_context.as_ref(),
            candidates: &self.candidates,
            page_views: &self.page_views,
            agent_data: self.agent_data.as_ref(),
            mode: self.mode,
            want_debug: self.debug,
        }
    }
}

/// A complete chat reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text.
    pub reply: String,

    /// Distinct retrieval sources behind the reply, first-seen order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// The assembly trace, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<PromptDebug>,
}

/// Operational stats for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    /// Active backend identity ("local" or "remote").
    pub backend: String,

    /// Configured history window bound.
    pub history_limit: usize,

    /// Local runtime context window, when the backend is local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,

    /// Local accelerator layer count, when the backend is local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_layers: Option<usize>,

    /// Indexed chunk count, when retrieval is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_chunks: Option<usize>,

    /// Indexed document count, when retrieval is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_documents: Option<usize>,
}

/// Local runtime parameters surfaced through `stats`.
#[derive(Debug, Clone, Copy)]
pub struct LocalRuntimeInfo {
    pub context_window: usize,
    pub gpu_layers: usize,
}

/// The chat engine. Construct once at startup and share.
pub struct ChatEngine {
    provider: Arc<dyn Provider>,
    assembler: PromptAssembler,
    store: Option<Arc<RetrievalStore>>,
    generation: GenerationConfig,
    local_info: Option<LocalRuntimeInfo>,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        assembler: PromptAssembler,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            provider,
            assembler,
            store: None,
            generation,
            local_info: None,
        }
    }

    /// Attach the retrieval store for stats reporting. The assembler holds
    /// its own reference for context injection.
    pub fn with_store(mut self, store: Arc<RetrievalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record local runtime parameters for stats reporting.
    pub fn with_local_info(mut self, info: LocalRuntimeInfo) -> Self {
        self.local_info = Some(info);
        self
    }

    /// Prepare the backend (load weights, verify credentials). Fatal at
    /// startup when it fails.
    pub async fn load(&self) -> Result<()> {
        self.provider.load().await?;
        Ok(())
    }

    /// Whether the backend is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.provider.is_ready()
    }

    fn generation_request(&self, prompt: String) -> GenerationRequest {
        GenerationRequest {
            prompt,
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            repeat_penalty: self.generation.repeat_penalty,
            // The local runtime must halt at the turn delimiter; the remote
            // provider ignores this (see its translator notes).
            stop: vec![TURN_END.to_string()],
        }
    }

    async fn assemble(&self, request: &ChatRequest) -> AssembledPrompt {
        self.assembler.build(&request.assembly_input()).await
    }

    /// Generate a complete reply.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, message_len = request.message.len(), "Chat request");

        let assembled = self.assemble(request).await;
        let reply = self
            .provider
            .generate(self.generation_request(assembled.prompt))
            .await?;

        info!(%request_id, reply_len = reply.len(), "Chat complete");

        Ok(ChatResponse {
            reply: reply.trim().to_string(),
            sources: assembled.sources,
            debug: assembled.debug,
        })
    }

    /// Generate a reply as a tagged event stream: debug trace first (when
    /// requested), then tokens in generation order, then `done` carrying
    /// the retrieval sources. Dropping the receiver cancels generation.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<mpsc::Receiver<ChatStreamEvent>> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, "Chat stream request");

        let assembled = self.assemble(request).await;
        let mut tokens = self
            .provider
            .generate_stream(self.generation_request(assembled.prompt))
            .await?;

        let (tx, rx) = mpsc::channel(64);
        let debug_info = assembled.debug;
        let sources = assembled.sources;

        tokio::spawn(async move {
            if let Some(info) = debug_info {
                if tx.send(ChatStreamEvent::Debug { info }).await.is_err() {
                    return;
                }
            }

            while let Some(item) = tokens.recv().await {
                match item {
                    Ok(content) => {
                        if tx.send(ChatStreamEvent::Token { content }).await.is_err() {
                            return; // receiver dropped — cancellation
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(ChatStreamEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }

            let _ = tx.send(ChatStreamEvent::Done { sources }).await;
        });

        Ok(rx)
    }

    /// Operational stats: history bound, backend identity, local runtime
    /// parameters, and index counts.
    pub async fn stats(&self) -> EngineStats {
        let (indexed_chunks, indexed_documents) = match &self.store {
            Some(store) => match store.stats().await {
                Ok(stats) => (Some(stats.vectors), Some(stats.sources)),
                Err(_) => (None, None),
            },
            None => (None, None),
        };

        EngineStats {
            backend: self.provider.name().to_string(),
            history_limit: self.assembler.history_limit(),
            context_window: self.local_info.map(|i| i.context_window),
            gpu_layers: self.local_info.map(|i| i.gpu_layers),
            indexed_chunks,
            indexed_documents,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Persona;
    use async_trait::async_trait;
    use promptloom_core::{Embedder, ProviderError, RetrievalError, TokenStream};
    use promptloom_retrieval::{Chunker, MemoryIndex};

    /// Scripted provider: returns a fixed reply, streamed word-by-word.
    struct MockProvider {
        reply: String,
    }

    impl MockProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn load(&self) -> std::result::Result<(), ProviderError> {
            Ok(())
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<String, ProviderError> {
            Ok(self.reply.clone())
        }

        async fn generate_stream(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<TokenStream, ProviderError> {
            let (tx, rx) = mpsc::channel(8);
            let reply = self.reply.clone();
            tokio::spawn(async move {
                let mut rest = reply.as_str();
                // Split into fragments at word boundaries, keeping spaces.
                while !rest.is_empty() {
                    let cut = rest
                        .char_indices()
                        .skip(1)
                        .find(|(_, c)| *c == ' ')
                        .map(|(i, _)| i)
                        .unwrap_or(rest.len());
                    if tx.send(Ok(rest[..cut].to_string())).await.is_err() {
                        return;
                    }
                    rest = &rest[cut..];
                }
            });
            Ok(rx)
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    struct FailingStreamProvider;

    #[async_trait]
    impl Provider for FailingStreamProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn load(&self) -> std::result::Result<(), ProviderError> {
            Ok(())
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<String, ProviderError> {
            Err(ProviderError::Timeout("deadline exceeded".into()))
        }

        async fn generate_stream(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<TokenStream, ProviderError> {
            let (tx, rx) = mpsc::channel(2);
            tokio::spawn(async move {
                let _ = tx.send(Ok("partial".to_string())).await;
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted("connection reset".into())))
                    .await;
            });
            Ok(rx)
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            1
        }

        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn engine_with(provider: Arc<dyn Provider>) -> ChatEngine {
        ChatEngine::new(
            provider,
            PromptAssembler::new(Persona::default(), 5),
            GenerationConfig::default(),
        )
    }

    #[tokio::test]
    async fn chat_returns_trimmed_reply() {
        let engine = engine_with(Arc::new(MockProvider::new("  The answer.  ")));
        let response = engine.chat(&ChatRequest::new("question")).await.unwrap();
        assert_eq!(response.reply, "The answer.");
        assert!(response.sources.is_empty());
        assert!(response.debug.is_none());
    }

    #[tokio::test]
    async fn chat_surfaces_provider_errors() {
        let engine = engine_with(Arc::new(FailingStreamProvider));
        let err = engine.chat(&ChatRequest::new("question")).await.unwrap_err();
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[tokio::test]
    async fn sequential_requests_share_the_engine_safely() {
        let engine = engine_with(Arc::new(MockProvider::new("ok")));
        let first = engine.chat(&ChatRequest::new("one")).await.unwrap();
        let second = engine.chat(&ChatRequest::new("two")).await.unwrap();
        assert_eq!(first.reply, second.reply);
    }

    #[tokio::test]
    async fn stream_concatenation_equals_nonstreaming_reply() {
        let reply = "The quick brown fox jumps over the lazy dog";
        let engine = engine_with(Arc::new(MockProvider::new(reply)));
        let request = ChatRequest::new("question");

        let complete = engine.chat(&request).await.unwrap().reply;

        let mut rx = engine.chat_stream(&request).await.unwrap();
        let mut streamed = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                ChatStreamEvent::Token { content } => streamed.push_str(&content),
                ChatStreamEvent::Done { .. } => break,
                other => panic!("unexpected event: {}", other.event_type()),
            }
        }

        assert_eq!(streamed.trim(), complete);
    }

    #[tokio::test]
    async fn stream_emits_debug_first_then_tokens_then_done() {
        let engine = engine_with(Arc::new(MockProvider::new("hello world")));
        let mut request = ChatRequest::new("question");
        request.debug = true;

        let mut rx = engine.chat_stream(&request).await.unwrap();
        let mut kinds: Vec<&'static str> = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.event_type());
        }

        assert_eq!(kinds.first(), Some(&"debug"));
        assert_eq!(kinds.last(), Some(&"done"));
        assert!(kinds[1..kinds.len() - 1].iter().all(|k| *k == "token"));
    }

    #[tokio::test]
    async fn stream_without_debug_has_no_debug_event() {
        let engine = engine_with(Arc::new(MockProvider::new("hello")));
        let mut rx = engine.chat_stream(&ChatRequest::new("q")).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "token");
    }

    #[tokio::test]
    async fn stream_error_terminates_the_stream() {
        let engine = engine_with(Arc::new(FailingStreamProvider));
        let mut rx = engine.chat_stream(&ChatRequest::new("q")).await.unwrap();

        let mut kinds: Vec<&'static str> = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.event_type());
        }
        assert_eq!(kinds, vec!["token", "error"]);
    }

    #[tokio::test]
    async fn stats_report_backend_and_index_counts() {
        let store = Arc::new(RetrievalStore::new(
            Arc::new(StubEmbedder),
            Arc::new(MemoryIndex::new()),
            Chunker::new(200, 40),
            4,
        ));
        store
            .add_document("guide.md", "Some indexable reference text here.")
            .await
            .unwrap();

        let engine = engine_with(Arc::new(MockProvider::new("ok")))
            .with_store(store)
            .with_local_info(LocalRuntimeInfo {
                context_window: 4096,
                gpu_layers: 0,
            });

        let stats = engine.stats().await;
        assert_eq!(stats.backend, "mock");
        assert_eq!(stats.history_limit, 5);
        assert_eq!(stats.context_window, Some(4096));
        assert_eq!(stats.gpu_layers, Some(0));
        assert_eq!(stats.indexed_chunks, Some(1));
        assert_eq!(stats.indexed_documents, Some(1));
    }

    #[tokio::test]
    async fn stats_without_retrieval_or_local_runtime() {
        let engine = engine_with(Arc::new(MockProvider::new("ok")));
        let stats = engine.stats().await;
        assert!(stats.indexed_chunks.is_none());
        assert!(stats.context_window.is_none());
    }
}
