//! Engine-level streaming events.
//!
//! The stream is an explicit tagged sequence — the debug trace is its own
//! variant emitted once at the head when requested, never a specially
//! shaped first token:
//!
//! - `debug` — the prompt-assembly trace (only when requested)
//! - `token` — partial text fragment from the provider
//! - `done`  — stream complete, with the retrieval sources used
//! - `error` — an error occurred mid-stream

use serde::{Deserialize, Serialize};

use crate::assembler::PromptDebug;

/// Events emitted by the engine during streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// The assembly debug trace, emitted first when requested.
    Debug { info: PromptDebug },

    /// Partial text fragment from the provider.
    Token { content: String },

    /// The stream is complete.
    Done { sources: Vec<String> },

    /// An error occurred mid-stream; no further events follow.
    Error { message: String },
}

impl ChatStreamEvent {
    /// Wire event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Debug { .. } => "debug",
            Self::Token { .. } => "token",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_serialization() {
        let event = ChatStreamEvent::Token {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"token""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn done_serialization() {
        let event = ChatStreamEvent::Done {
            sources: vec!["pricing.md".into()],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains("pricing.md"));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            ChatStreamEvent::Token { content: "x".into() }.event_type(),
            "token"
        );
        assert_eq!(
            ChatStreamEvent::Done { sources: vec![] }.event_type(),
            "done"
        );
        assert_eq!(
            ChatStreamEvent::Error { message: "x".into() }.event_type(),
            "error"
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"token","content":"hi"}"#;
        let event: ChatStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            ChatStreamEvent::Token { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
