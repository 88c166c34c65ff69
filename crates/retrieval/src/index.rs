//! In-process vector index.
//!
//! [`MemoryIndex`] keeps vectors in a `RwLock`ed `Vec` and ranks queries
//! by cosine similarity. It is the default backend and the reference
//! implementation of the `VectorIndex` seam; an external index service
//! plugs in behind the same trait.

use async_trait::async_trait;
use promptloom_core::{IndexStats, IndexedVector, RetrievalError, RetrievalResult, VectorIndex};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if either vector is zero-length or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// An in-memory vector index.
///
/// Safe for concurrent queries; writes take the lock exclusively.
pub struct MemoryIndex {
    vectors: RwLock<Vec<IndexedVector>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_ready(&self) -> Result<(), RetrievalError> {
        Ok(())
    }

    async fn upsert(&self, incoming: Vec<IndexedVector>) -> Result<(), RetrievalError> {
        let mut vectors = self.vectors.write().await;
        for vector in incoming {
            match vectors.iter_mut().find(|v| v.id == vector.id) {
                Some(existing) => *existing = vector,
                None => vectors.push(vector),
            }
        }
        Ok(())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, RetrievalError> {
        let mut vectors = self.vectors.write().await;
        let before = vectors.len();
        vectors.retain(|v| v.source != source);
        Ok(before - vectors.len())
    }

    async fn delete_all(&self) -> Result<(), RetrievalError> {
        self.vectors.write().await.clear();
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let vectors = self.vectors.read().await;

        let mut scored: Vec<RetrievalResult> = vectors
            .iter()
            .map(|v| RetrievalResult {
                text: v.text.clone(),
                source: v.source.clone(),
                score: cosine_similarity(&v.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        let vectors = self.vectors.read().await;
        let sources: HashSet<&str> = vectors.iter().map(|v| v.source.as_str()).collect();
        Ok(IndexStats {
            vectors: vectors.len(),
            sources: sources.len(),
        })
    }
}
