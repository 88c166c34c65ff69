//! # Promptloom Core
//!
//! Domain types, traits, and error definitions for the Promptloom context
//! engine. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod conversation;
pub mod enrichment;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use conversation::{ChatMessage, ConversationTurn, Role};
pub use enrichment::{
    AgentIntelligence, BrowsingSummary, CompanyResearch, IdentityCandidate, PanelVisit,
    ProfileStore, UserContext,
};
pub use error::{Error, ProviderError, Result, RetrievalError};
pub use prompt::{flatten, ROLE_CLOSE, ROLE_OPEN, TURN_END};
pub use provider::{GenerationRequest, Provider, TokenStream};
pub use retrieval::{
    DocumentChunk, Embedder, IndexStats, IndexedVector, RetrievalResult, VectorIndex,
};
