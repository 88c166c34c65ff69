//! Optional enrichment inputs consumed by the prompt assembler.
//!
//! None of these types are owned or persisted by the engine. They arrive
//! from external stores (user profiles, third-party agent platforms) and
//! every field is optional: a missing field is simply not rendered into
//! the prompt, never replaced with placeholder text.
//!
//! Fact maps use `BTreeMap` so that rendering order — and therefore the
//! assembled prompt — is deterministic for identical inputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RetrievalError;

/// Structured facts known about the current user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// Whether this user has been seen before.
    #[serde(default)]
    pub returning_user: bool,

    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Summary of the user's previous conversation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<String>,

    /// Interest tags carried over from earlier sessions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,

    /// Free-form facts keyed by snake_case label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facts: BTreeMap<String, String>,

    /// Identifier in the external profile store, when the user is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A possible identity match for an unverified visitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityCandidate {
    /// Name on the candidate profile.
    pub name: String,
    /// Last topic this candidate discussed, for a "were you asking about X?"
    /// verification prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_topic: Option<String>,
}

/// Third-party agent-platform enrichment about a user/lead.
///
/// Treated as untrusted, optional input throughout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentIntelligence {
    /// Interest tier: "hot", "warm", "cold", or anything else the platform
    /// decides to send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_level: Option<String>,

    /// Lead qualification status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_status: Option<String>,

    /// Facts the platform extracted beyond what we know locally.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enhanced_facts: BTreeMap<String, String>,

    /// The platform's own summary of the conversation so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,

    /// Nested company-research result, when the platform resolved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_research: Option<CompanyResearch>,
}

impl AgentIntelligence {
    /// True when no field carries data — nothing would be rendered.
    pub fn is_empty(&self) -> bool {
        self.interest_level.is_none()
            && self.lead_status.is_none()
            && self.enhanced_facts.is_empty()
            && self.conversation_summary.is_none()
            && self.company_research.is_none()
    }
}

/// Company research attached to agent intelligence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyResearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Condensed browsing history for one user, as served by the profile store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowsingSummary {
    /// Most-visited panels, descending by count.
    #[serde(default)]
    pub top_panels: Vec<PanelVisit>,
}

/// One entry in a browsing summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelVisit {
    pub title: String,
    pub count: u32,
}

/// Read-only view onto the external user-profile store.
///
/// The engine never writes through this trait; persistence of profiles is
/// entirely the external store's responsibility.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a condensed browsing summary for a known user.
    async fn browsing_summary(&self, user_id: &str) -> std::result::Result<BrowsingSummary, RetrievalError>;
}
