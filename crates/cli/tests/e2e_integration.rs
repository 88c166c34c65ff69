//! End-to-end pipeline tests: index documents, assemble a prompt through
//! the engine, and verify the remote translator recovers the exact turn
//! structure the assembler encoded.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use promptloom_core::{
    ConversationTurn, Embedder, GenerationRequest, Provider, ProviderError, RetrievalError, Role,
    TokenStream, UserContext,
};
use promptloom_engine::{
    ChatEngine, ChatRequest, ChatStreamEvent, Persona, PersonaMode, PromptAssembler,
};
use promptloom_providers::translate;
use promptloom_retrieval::{Chunker, MemoryIndex, RetrievalStore};
use promptloom_config::GenerationConfig;

/// Deterministic embedder keyed on a few marker words.
struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    fn name(&self) -> &str {
        "stub"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                vec![
                    lower.matches("pricing").count() as f32 + 0.1,
                    lower.matches("support").count() as f32 + 0.1,
                ]
            })
            .collect())
    }
}

/// Provider that records the prompt it was handed and returns a scripted
/// reply, streamed in small fragments.
struct CaptureProvider {
    reply: String,
    seen_prompt: Mutex<Option<String>>,
}

impl CaptureProvider {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.into(),
            seen_prompt: Mutex::new(None),
        }
    }

    fn prompt(&self) -> String {
        self.seen_prompt.lock().unwrap().clone().expect("no prompt captured")
    }
}

#[async_trait]
impl Provider for CaptureProvider {
    fn name(&self) -> &str {
        "capture"
    }

    async fn load(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        *self.seen_prompt.lock().unwrap() = Some(request.prompt);
        Ok(self.reply.clone())
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<TokenStream, ProviderError> {
        *self.seen_prompt.lock().unwrap() = Some(request.prompt);
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let reply = self.reply.clone();
        tokio::spawn(async move {
            for piece in reply.split_inclusive(' ') {
                if tx.send(Ok(piece.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    fn is_ready(&self) -> bool {
        true
    }
}

async fn indexed_store() -> Arc<RetrievalStore> {
    let store = Arc::new(RetrievalStore::new(
        Arc::new(StubEmbedder),
        Arc::new(MemoryIndex::new()),
        Chunker::new(300, 60),
        4,
    ));
    store.initialize().await.unwrap();
    store
        .add_document("pricing.md", "Pricing starts at ten dollars per seat per month.")
        .await
        .unwrap();
    store
        .add_document("support.md", "Support is available around the clock on paid plans.")
        .await
        .unwrap();
    store
}

fn engine_with(provider: Arc<CaptureProvider>, store: Arc<RetrievalStore>) -> ChatEngine {
    let assembler = PromptAssembler::new(Persona::default(), 2).with_store(store.clone());
    ChatEngine::new(provider, assembler, GenerationConfig::default()).with_store(store)
}

#[tokio::test]
async fn full_pipeline_chat_with_retrieval_and_history() {
    let provider = Arc::new(CaptureProvider::new("Plans start at ten dollars."));
    let store = indexed_store().await;
    let engine = engine_with(provider.clone(), store);

    let mut request = ChatRequest::new("What does pricing look like?");
    request.history = vec![
        ConversationTurn::new("old question", "old answer"),
        ConversationTurn::new("Hi", "Hello! How can I help?"),
        ConversationTurn::new("Do you have docs?", "Yes, at docs.example.com."),
    ];
    request.user_context = Some(UserContext {
        returning_user: true,
        name: Some("Alice".into()),
        ..Default::default()
    });
    request.debug = true;

    let response = engine.chat(&request).await.unwrap();
    assert_eq!(response.reply, "Plans start at ten dollars.");
    assert!(response.sources.contains(&"pricing.md".to_string()));

    let debug = response.debug.unwrap();
    // history_limit = 2: only the last two turns were encoded.
    assert_eq!(debug.history_turns_used, 2);
    assert!(debug.system_content.contains("ten dollars"));
    assert!(debug.user_block.contains("Alice"));

    // The provider saw a well-formed flattened prompt.
    let prompt = provider.prompt();
    assert!(!prompt.contains("old question"));
    assert!(prompt.contains("Do you have docs?"));
}

#[tokio::test]
async fn translator_recovers_the_assembled_turn_structure() {
    let provider = Arc::new(CaptureProvider::new("reply"));
    let store = indexed_store().await;
    let engine = engine_with(provider.clone(), store);

    let mut request = ChatRequest::new("Tell me about support");
    request.history = vec![ConversationTurn::new("Hi", "Hello!")];

    engine.chat(&request).await.unwrap();
    let prompt = provider.prompt();

    let messages = translate::unflatten(&prompt);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains("around the clock"));
    assert_eq!(messages[1].content, "Hi");
    assert_eq!(messages[2].content, "Hello!");
    assert_eq!(messages[3].content, "Tell me about support");
    // The generation cursor never becomes a message.
    assert_ne!(messages.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn streaming_matches_nonstreaming_through_the_full_stack() {
    let provider = Arc::new(CaptureProvider::new("one two three four"));
    let store = indexed_store().await;
    let engine = engine_with(provider.clone(), store);

    let request = ChatRequest::new("pricing?");
    let complete = engine.chat(&request).await.unwrap().reply;

    let mut rx = engine.chat_stream(&request).await.unwrap();
    let mut streamed = String::new();
    let mut saw_done = false;
    while let Some(event) = rx.recv().await {
        match event {
            ChatStreamEvent::Token { content } => streamed.push_str(&content),
            ChatStreamEvent::Done { sources } => {
                saw_done = true;
                assert!(!sources.is_empty());
            }
            other => panic!("unexpected event: {}", other.event_type()),
        }
    }

    assert!(saw_done);
    assert_eq!(streamed.trim(), complete);
}

#[tokio::test]
async fn admin_mode_marker_flows_to_the_provider() {
    let provider = Arc::new(CaptureProvider::new("ok"));
    let store = indexed_store().await;
    let engine = engine_with(provider.clone(), store);

    let mut request = ChatRequest::new("status?");
    request.mode = PersonaMode::Admin;
    engine.chat(&request).await.unwrap();

    let messages = translate::unflatten(&provider.prompt());
    assert!(messages[0].content.contains("No agent data available"));
}
