//! Prompt assembly pipeline — the core architectural component.
//!
//! Builds the flattened prompt from five ordered layers:
//!
//! 1. **Persona** (base text, admin-extended for administrative callers)
//! 2. **Retrieval context** (skipped entirely against an empty index)
//! 3. **User context** (identity, facts, page views, admin browsing summary)
//! 4. **Agent intelligence** (third-party lead enrichment)
//! 5. **Conversation** (bounded history window + current message)
//!
//! Every layer is appended only when its source data is non-empty —
//! omission, never placeholder text. The one deliberate exception: in
//! administrative mode, absent agent data renders an explicit "no data"
//! marker so an operator can tell "checked and empty" from "not checked".
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs always produce an
//! identical prompt. Fact maps are ordered, page views are deduplicated
//! order-preserving, and no time- or random-dependent text is rendered.

use std::sync::Arc;

use promptloom_core::prompt;
use promptloom_core::{
    AgentIntelligence, ConversationTurn, IdentityCandidate, ProfileStore, UserContext,
};
use promptloom_retrieval::RetrievalStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::persona::{Persona, PersonaMode};
use crate::token;

/// How many candidate identity matches the verification block lists.
const MAX_IDENTITY_CANDIDATES: usize = 3;

/// How many characters of system content the debug preview keeps.
const DEBUG_PREVIEW_CHARS: usize = 200;

// ── Types ─────────────────────────────────────────────────────────────────

/// All inputs for assembling one prompt.
pub struct AssemblyInput<'a> {
    /// The current user message.
    pub user_message: &'a str,
    /// Full conversation history; only the most recent window is encoded.
    pub history: &'a [ConversationTurn],
    /// Structured user facts, when known.
    pub user_context: Option<&'a UserContext>,
    /// Candidate identity matches for an unverified visitor.
    pub candidates: &'a [IdentityCandidate],
    /// Recently viewed pages, possibly with duplicates.
    pub page_views: &'a [String],
    /// Third-party agent enrichment. `None` means none was available.
    pub agent_data: Option<&'a AgentIntelligence>,
    /// Persona variant for this caller.
    pub mode: PersonaMode,
    /// Whether to capture a debug trace of the assembly.
    pub want_debug: bool,
}

/// The assembled prompt, ready for a provider.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// The flattened prompt string.
    pub prompt: String,
    /// Distinct retrieval sources, first-seen order.
    pub sources: Vec<String>,
    /// Present when `want_debug` was set.
    pub debug: Option<PromptDebug>,
}

/// Every contributing piece of one assembly, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDebug {
    /// Length of the system content in characters.
    pub system_len: usize,
    /// Truncated preview of the system content.
    pub system_preview: String,
    /// The full system content.
    pub system_content: String,
    /// Raw retrieval context block (empty if skipped).
    pub retrieval_context: String,
    /// Sources behind the retrieval context.
    pub retrieval_sources: Vec<String>,
    /// Raw user-context block (empty if omitted).
    pub user_block: String,
    /// Raw agent-intelligence block (empty if omitted).
    pub agent_block: String,
    /// History turns actually encoded.
    pub history_turns_used: usize,
    /// Total prompt length in characters.
    pub prompt_len: usize,
    /// Coarse token estimate (chars / 4), not a tokenizer call.
    pub estimated_tokens: usize,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds flattened prompts. Construct once and reuse; `build` is safe to
/// call concurrently.
pub struct PromptAssembler {
    persona: Persona,
    store: Option<Arc<RetrievalStore>>,
    profiles: Option<Arc<dyn ProfileStore>>,
    history_limit: usize,
}

impl PromptAssembler {
    /// Create an assembler with no retrieval store or profile store.
    pub fn new(persona: Persona, history_limit: usize) -> Self {
        Self {
            persona,
            store: None,
            profiles: None,
            history_limit: history_limit.max(1),
        }
    }

    /// Attach a retrieval store.
    pub fn with_store(mut self, store: Arc<RetrievalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the external profile store (admin browsing summaries).
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// The configured history window bound.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Assemble the flattened prompt.
    ///
    /// Infallible by design: retrieval or profile-store failures degrade
    /// to omission with a warning, they never fail the request.
    pub async fn build(&self, input: &AssemblyInput<'_>) -> AssembledPrompt {
        let mut system = self.persona.system_text(input.mode);

        let (retrieval_context, sources) = self.retrieval_context(input.user_message).await;
        if !retrieval_context.is_empty() {
            system.push_str("\n\n");
            system.push_str(&retrieval_context);
        }

        let user_block = self.render_user_block(input).await;
        if !user_block.is_empty() {
            system.push_str("\n\n");
            system.push_str(&user_block);
        }

        let agent_block = render_agent_block(input.agent_data, input.mode);
        if !agent_block.is_empty() {
            system.push_str("\n\n");
            system.push_str(&agent_block);
        }

        // Bounded history window: the most recent N turns, original order.
        let window_start = input.history.len().saturating_sub(self.history_limit);
        let window = &input.history[window_start..];

        let prompt = prompt::flatten(&system, window, input.user_message);

        let debug = input.want_debug.then(|| PromptDebug {
            system_len: system.len(),
            system_preview: preview(&system, DEBUG_PREVIEW_CHARS),
            system_content: system.clone(),
            retrieval_context: retrieval_context.clone(),
            retrieval_sources: sources.clone(),
            user_block,
            agent_block,
            history_turns_used: window.len(),
            prompt_len: prompt.len(),
            estimated_tokens: token::estimate_tokens(&prompt),
        });

        AssembledPrompt {
            prompt,
            sources,
            debug,
        }
    }

    /// Fetch retrieval context, or nothing.
    ///
    /// Skipped entirely when no store is attached or the index holds zero
    /// vectors; a retrieval failure degrades to omission.
    async fn retrieval_context(&self, query: &str) -> (String, Vec<String>) {
        let Some(store) = &self.store else {
            return (String::new(), Vec::new());
        };

        match store.stats().await {
            Ok(stats) if stats.vectors > 0 => {}
            Ok(_) => return (String::new(), Vec::new()),
            Err(e) => {
                warn!(error = %e, "Index stats unavailable, skipping retrieval context");
                return (String::new(), Vec::new());
            }
        }

        match store.context_with_sources(query).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                (String::new(), Vec::new())
            }
        }
    }

    /// Render the user-context block, or an empty string.
    async fn render_user_block(&self, input: &AssemblyInput<'_>) -> String {
        let mut lines: Vec<String> = Vec::new();

        if let Some(ctx) = input.user_context {
            if ctx.returning_user {
                match &ctx.name {
                    Some(name) => lines.push(format!(
                        "This is a returning user named {name}. Greet them personally."
                    )),
                    None => lines.push("This is a returning user.".into()),
                }
            }
            if let Some(summary) = &ctx.last_summary {
                lines.push(format!("Summary of their previous conversation: {summary}"));
            }
            if !ctx.interests.is_empty() {
                lines.push(format!(
                    "Their previous interests: {}",
                    ctx.interests.join(", ")
                ));
            }
        }

        if !input.candidates.is_empty() {
            lines.push(
                "The visitor may be one of these known users — verify identity naturally:".into(),
            );
            for candidate in input.candidates.iter().take(MAX_IDENTITY_CANDIDATES) {
                match &candidate.last_topic {
                    Some(topic) => {
                        lines.push(format!("- {} (last discussed: {topic})", candidate.name))
                    }
                    None => lines.push(format!("- {}", candidate.name)),
                }
            }
        }

        if let Some(ctx) = input.user_context {
            if !ctx.facts.is_empty() {
                lines.push("Known facts about this user:".into());
                for (key, value) in &ctx.facts {
                    lines.push(format!("- {}: {value}", humanize_label(key)));
                }
            }
        }

        if !input.page_views.is_empty() {
            let mut seen: Vec<String> = Vec::new();
            for view in input.page_views {
                if !seen.contains(view) {
                    seen.push(view.clone());
                }
            }
            lines.push(format!("Pages they viewed recently: {}", seen.join(", ")));
        }

        // Admin-only, and only when the user is known to the profile store.
        if input.mode == PersonaMode::Admin {
            let user_id = input
                .user_context
                .and_then(|ctx| ctx.user_id.as_deref());
            if let (Some(profiles), Some(user_id)) = (&self.profiles, user_id) {
                match profiles.browsing_summary(user_id).await {
                    Ok(summary) if !summary.top_panels.is_empty() => {
                        let rendered: Vec<String> = summary
                            .top_panels
                            .iter()
                            .map(|p| format!("{} ({}x)", p.title, p.count))
                            .collect();
                        lines.push(format!("Browsing history summary: {}", rendered.join(", ")));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Profile store unavailable, omitting browsing summary")
                    }
                }
            }
        }

        if lines.is_empty() {
            String::new()
        } else {
            format!("[User context]\n{}", lines.join("\n"))
        }
    }
}

// ── Block renderers ───────────────────────────────────────────────────────

/// Render the agent-intelligence block.
///
/// Standard mode: omitted when there is nothing to say. Admin mode: absent
/// data renders an explicit marker, and present data gets a one-line recap
/// of which fields arrived.
fn render_agent_block(agent: Option<&AgentIntelligence>, mode: PersonaMode) -> String {
    let Some(agent) = agent else {
        return match mode {
            PersonaMode::Admin => {
                "[Agent intelligence]\nNo agent data available for this conversation.".into()
            }
            PersonaMode::Standard => String::new(),
        };
    };

    let mut lines: Vec<String> = Vec::new();

    if let Some(level) = &agent.interest_level {
        lines.push(describe_interest(level));
    }
    if let Some(status) = &agent.lead_status {
        lines.push(format!("Lead status: {status}"));
    }
    if !agent.enhanced_facts.is_empty() {
        lines.push("Additional facts from agent analysis:".into());
        for (key, value) in &agent.enhanced_facts {
            lines.push(format!("- {}: {value}", humanize_label(key)));
        }
    }
    if let Some(summary) = &agent.conversation_summary {
        lines.push(format!("Conversation summary: {summary}"));
    }
    if let Some(company) = &agent.company_research {
        let mut parts: Vec<String> = Vec::new();
        if let Some(name) = &company.name {
            parts.push(format!("- Company: {name}"));
        }
        if let Some(industry) = &company.industry {
            parts.push(format!("- Industry: {industry}"));
        }
        if let Some(summary) = &company.summary {
            parts.push(format!("- About: {summary}"));
        }
        if !parts.is_empty() {
            lines.push("Company research:".into());
            lines.extend(parts);
        }
    }

    if mode == PersonaMode::Admin {
        lines.push(format!("Agent fields present: {}", present_fields(agent)));
    }

    if lines.is_empty() {
        String::new()
    } else {
        format!("[Agent intelligence]\n{}", lines.join("\n"))
    }
}

/// Map an interest tier to its fixed description. Unknown tiers render
/// verbatim rather than being dropped.
fn describe_interest(level: &str) -> String {
    match level {
        "hot" => "Interest level: Hot — actively evaluating and ready to engage.".into(),
        "warm" => "Interest level: Warm — interested but still exploring options.".into(),
        "cold" => "Interest level: Cold — browsing casually with no clear intent.".into(),
        other => format!("Interest level: {other}"),
    }
}

/// Compact recap of which agent fields carried data.
fn present_fields(agent: &AgentIntelligence) -> String {
    let mut present: Vec<&str> = Vec::new();
    if agent.interest_level.is_some() {
        present.push("interest_level");
    }
    if agent.lead_status.is_some() {
        present.push("lead_status");
    }
    if !agent.enhanced_facts.is_empty() {
        present.push("enhanced_facts");
    }
    if agent.conversation_summary.is_some() {
        present.push("conversation_summary");
    }
    if agent.company_research.is_some() {
        present.push("company_research");
    }

    if present.is_empty() {
        "none".into()
    } else {
        present.join(", ")
    }
}

/// Turn a snake_case key into a readable label: `company_size` →
/// `Company Size`.
fn humanize_label(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Char-safe truncation for the debug preview.
fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(limit).collect();
        format!("{truncated}...")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
