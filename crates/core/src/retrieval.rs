//! Retrieval domain types and collaborator traits.
//!
//! The retrieval pipeline is built from two seams:
//! - [`Embedder`] — batch text → fixed-dimension vectors
//! - [`VectorIndex`] — vector storage with similarity query
//!
//! Implementations live in `promptloom-retrieval`; anything that speaks
//! these traits (an external index service, a local model) can be swapped
//! in without touching the store or the assembler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A bounded, overlap-aware slice of a source document.
///
/// Chunk ids are deterministic from the source name and chunk position, so
/// re-chunking identical text always yields identical ids — the property
/// that makes re-indexing a source a full replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Source-scoped stable id, e.g. `"pricing.md::3"`.
    pub id: String,
    /// The chunk text (non-empty after trimming).
    pub text: String,
    /// Identifier of the originating document.
    pub source: String,
}

/// A chunk paired with its embedding, as stored in the vector index.
///
/// Owned exclusively by the index: created on `add_document`, replaced
/// wholesale when the same source is re-added, removed on `delete_all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub source: String,
    /// When this vector was written.
    pub indexed_at: DateTime<Utc>,
}

/// One ranked passage returned by a similarity query.
///
/// Ephemeral — produced per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    pub source: String,
    /// Similarity score; higher is more relevant.
    pub score: f32,
}

/// Counts reported by the index backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total stored vectors (chunks).
    pub vectors: usize,
    /// Distinct source documents.
    pub sources: usize,
}

/// The vector-index collaborator.
///
/// Process-wide, initialized once, safe for concurrent `query` calls.
/// `delete_by_source` followed by `upsert` (the re-index path) is not
/// atomic against concurrent queries of the same source; a query may
/// transiently observe a partially-replaced source. This is an accepted,
/// documented race.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The backend name (e.g., "memory").
    fn name(&self) -> &str;

    /// Create the index if absent and verify it is reachable.
    async fn ensure_ready(&self) -> std::result::Result<(), RetrievalError>;

    /// Insert or replace vectors by id.
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> std::result::Result<(), RetrievalError>;

    /// Delete every vector tagged with the given source.
    ///
    /// Deleting from an empty index, or a source with no vectors, is not
    /// an error; returns the number of vectors removed.
    async fn delete_by_source(&self, source: &str) -> std::result::Result<usize, RetrievalError>;

    /// Delete everything.
    async fn delete_all(&self) -> std::result::Result<(), RetrievalError>;

    /// Similarity query: the `k` nearest stored vectors, descending by
    /// score. Ties are broken by backend order.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<RetrievalResult>, RetrievalError>;

    /// Current index counts.
    async fn stats(&self) -> std::result::Result<IndexStats, RetrievalError>;
}

/// The embedding-function collaborator: batch text → vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The embedder name (e.g., "http").
    fn name(&self) -> &str;

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts. The result has one vector per input, in
    /// input order.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RetrievalError>;
}
