//! The retrieval store — the facade over chunker, embedder, and index.
//!
//! Owns the process-wide embedding function and index connection.
//! Initialized once at startup; `search` is safe to call concurrently.
//! `add_document` performs a delete-then-insert for its source and is not
//! atomic against concurrent searches of that source — a search may
//! transiently see a partially-replaced source. Accepted race.

use std::sync::Arc;

use chrono::Utc;
use promptloom_core::{
    Embedder, IndexStats, IndexedVector, RetrievalError, RetrievalResult, VectorIndex,
};
use tracing::{info, warn};

use crate::chunker::Chunker;

/// Chunks, embeds, and indexes reference documents; answers ranked
/// similarity queries over them.
pub struct RetrievalStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunker: Chunker,
    top_k: usize,
}

impl RetrievalStore {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunker: Chunker,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            chunker,
            top_k: top_k.max(1),
        }
    }

    /// Establish the index connection. Idempotent; call once at process
    /// start. A failure here is a startup error, not a per-request one.
    pub async fn initialize(&self) -> Result<(), RetrievalError> {
        self.index.ensure_ready().await?;
        let stats = self.index.stats().await?;
        info!(
            index = self.index.name(),
            embedder = self.embedder.name(),
            vectors = stats.vectors,
            sources = stats.sources,
            "Retrieval store initialized"
        );
        Ok(())
    }

    /// Index a document: replace any prior vectors for `source`, chunk the
    /// text, embed all chunks in one batch, and upsert.
    ///
    /// Returns the number of chunks indexed; 0 for blank input, in which
    /// case the index is not touched at all.
    pub async fn add_document(&self, source: &str, text: &str) -> Result<usize, RetrievalError> {
        if text.trim().is_empty() {
            return Ok(0);
        }

        let chunks = self.chunker.chunk(text, source);
        if chunks.is_empty() {
            return Ok(0);
        }

        // Best effort: an empty index or unknown source is not an error,
        // and a failed cleanup must not block indexing the new content.
        let replaced = match self.index.delete_by_source(source).await {
            Ok(n) => n,
            Err(e) => {
                warn!(source, error = %e, "Failed to clear prior vectors, continuing");
                0
            }
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RetrievalError::EmbeddingFailed(format!(
                "expected {} vectors for '{source}', got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let indexed_at = Utc::now();
        let vectors: Vec<IndexedVector> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedVector {
                id: chunk.id,
                embedding,
                text: chunk.text,
                source: chunk.source,
                indexed_at,
            })
            .collect();

        let count = vectors.len();
        self.index.upsert(vectors).await?;

        info!(source, chunks = count, replaced, "Document indexed");
        Ok(count)
    }

    /// Similarity search: the `k` most relevant chunks, descending by
    /// score. Embedding or index failures propagate as errors — an empty
    /// `Vec` always means "nothing relevant", never "retrieval broke".
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let embedding = embeddings
            .first()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("empty embedding batch".into()))?;
        self.index.query(embedding, k).await
    }

    /// Search wrapped for prompt injection: a readable preamble with
    /// numbered passages, plus the distinct source names in first-seen
    /// order. Returns empty strings/lists when nothing matches.
    pub async fn context_with_sources(
        &self,
        query: &str,
    ) -> Result<(String, Vec<String>), RetrievalError> {
        let results = self.search(query, self.top_k).await?;
        if results.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut context = String::from("Relevant information from the knowledge base:\n");
        let mut sources: Vec<String> = Vec::new();

        for (i, result) in results.iter().enumerate() {
            context.push_str(&format!(
                "\n[{}] (source: {})\n{}\n",
                i + 1,
                result.source,
                result.text
            ));
            if !sources.contains(&result.source) {
                sources.push(result.source.clone());
            }
        }

        Ok((context, sources))
    }

    /// Current index counts, for the engine's stats surface.
    pub async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        self.index.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use async_trait::async_trait;
    use promptloom_core::Embedder;

    /// Deterministic embedder: counts a few marker letters so that texts
    /// sharing words land near each other under cosine similarity.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    let count = |word: &str| lower.matches(word).count() as f32;
                    vec![
                        count("rust") + 0.01,
                        count("python"),
                        count("pricing"),
                        count("cloud"),
                    ]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Err(RetrievalError::EmbeddingFailed("endpoint down".into()))
        }
    }

    fn store() -> RetrievalStore {
        RetrievalStore::new(
            Arc::new(StubEmbedder),
            Arc::new(MemoryIndex::new()),
            Chunker::new(200, 40),
            4,
        )
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = store();
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn blank_document_indexes_nothing() {
        let store = store();
        assert_eq!(store.add_document("empty.md", "").await.unwrap(), 0);
        assert_eq!(store.add_document("empty.md", "  \n\t ").await.unwrap(), 0);
        assert_eq!(store.stats().await.unwrap().vectors, 0);
    }

    #[tokio::test]
    async fn add_and_search() {
        let store = store();
        store
            .add_document("langs.md", "Rust is a systems language. Python is for scripting.")
            .await
            .unwrap();
        store
            .add_document("pricing.md", "Pricing starts at ten dollars per seat.")
            .await
            .unwrap();

        let results = store.search("tell me about rust", 2).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].source, "langs.md");
    }

    #[tokio::test]
    async fn readding_a_source_supersedes_prior_content() {
        let store = store();
        let first = store
            .add_document("doc.md", "Rust rust rust. Rust everywhere in this text.")
            .await
            .unwrap();
        assert!(first > 0);

        store
            .add_document("doc.md", "Pricing details only now.")
            .await
            .unwrap();

        let results = store.search("rust", 10).await.unwrap();
        let from_doc: Vec<_> = results.iter().filter(|r| r.source == "doc.md").collect();
        for result in from_doc {
            assert!(
                !result.text.to_lowercase().contains("rust"),
                "stale chunk survived re-indexing: {}",
                result.text
            );
        }
    }

    #[tokio::test]
    async fn embedding_failure_is_an_error_not_empty_results() {
        let store = RetrievalStore::new(
            Arc::new(FailingEmbedder),
            Arc::new(MemoryIndex::new()),
            Chunker::new(200, 40),
            4,
        );
        let err = store.search("anything", 3).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailed(_)));
    }

    #[tokio::test]
    async fn context_with_sources_dedupes_in_first_seen_order() {
        let store = store();
        store
            .add_document("a.md", "Rust rust rust rust here.")
            .await
            .unwrap();
        store
            .add_document("b.md", "Rust also appears once, mostly cloud cloud cloud content.")
            .await
            .unwrap();

        let (context, sources) = store.context_with_sources("rust").await.unwrap();
        assert!(context.starts_with("Relevant information"));
        assert!(context.contains("[1]"));
        assert_eq!(sources.len(), 2);
        // Highest-scoring source first, each source listed once.
        assert_eq!(sources[0], "a.md");
    }

    #[tokio::test]
    async fn context_is_empty_when_index_is_empty() {
        let store = store();
        let (context, sources) = store.context_with_sources("rust").await.unwrap();
        assert!(context.is_empty());
        assert!(sources.is_empty());
    }
}
