//! Persona — the base system text and its administrative variant.

use serde::{Deserialize, Serialize};

/// Selects between the standard and administrative system-prompt variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaMode {
    /// Ordinary visitor-facing persona.
    #[default]
    Standard,
    /// Administrative caller: the base persona plus an operator addendum.
    Admin,
}

/// The fallback persona when no override is configured.
const DEFAULT_PERSONA: &str = concat!(
    "You are Loom, a knowledgeable and friendly assistant. ",
    "Answer questions accurately using the context you are given, ",
    "keep responses concise, and ask a clarifying question when the ",
    "request is ambiguous. Never invent facts that are not in your context.",
);

/// Appended for administrative sessions. Wraps the base persona — the
/// standard behavior rules stay in force underneath it.
const ADMIN_ADDENDUM: &str = concat!(
    "You are currently speaking with an administrator. ",
    "Be direct and report on the data you were given, including explicit ",
    "notes about which context was available for this conversation.",
);

/// The persona text source.
#[derive(Debug, Clone)]
pub struct Persona {
    base: String,
}

impl Persona {
    /// A persona with custom base text.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// The built-in persona, or `override_text` when configured.
    pub fn from_override(override_text: Option<&str>) -> Self {
        match override_text {
            Some(text) if !text.trim().is_empty() => Self::new(text),
            _ => Self::default(),
        }
    }

    /// Render the system text for the given mode. Admin mode extends the
    /// base text, it never replaces it.
    pub fn system_text(&self, mode: PersonaMode) -> String {
        match mode {
            PersonaMode::Standard => self.base.clone(),
            PersonaMode::Admin => format!("{}\n\n{ADMIN_ADDENDUM}", self.base),
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}
