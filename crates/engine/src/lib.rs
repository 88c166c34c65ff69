//! Context assembly and the chat surface for Promptloom.
//!
//! The [`assembler::PromptAssembler`] merges persona, retrieval context,
//! user-profile facts, agent intelligence, and bounded history into one
//! deterministic flattened prompt; [`engine::ChatEngine`] hands that
//! prompt to the configured provider and exposes `chat`, `chat_stream`,
//! and `stats` to callers.

pub mod assembler;
pub mod engine;
pub mod persona;
pub mod stream_event;
pub mod token;

pub use assembler::{AssembledPrompt, AssemblyInput, PromptAssembler, PromptDebug};
pub use engine::{ChatEngine, ChatRequest, ChatResponse, EngineStats, LocalRuntimeInfo};
pub use persona::{Persona, PersonaMode};
pub use stream_event::ChatStreamEvent;
