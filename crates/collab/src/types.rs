//! Wire types exchanged with the reasoning and summarization
//! collaborators.
//!
//! Requests are what the backend can prove; responses are untrusted and
//! parsed strictly (`deny_unknown_fields`), every ref inside them treated
//! as a claim to check against the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use cs_registry::{CurationDecision, LifecycleState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reasoner request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /v1/decide — request body.
///
/// History and context arrive pre-rendered; the collaborator never sees a
/// durable identifier, only callsigns.
#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    pub session_id: String,
    pub turn_index: u32,
    pub user_text: String,
    /// Narrative summary plus verbatim recent turns.
    pub history: String,
    /// Formatted tier projection (callsigns with labels).
    pub context_refs: String,
    /// Durable numeric and temporal facts, by name.
    pub constraints: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmation>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reasoner response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /v1/decide — response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Decision {
    pub assistant_text: String,
    pub decision_kind: DecisionKind,
    /// What happened to durable records this turn, in execution order.
    #[serde(default)]
    pub effects: Vec<EntityEffect>,
    /// Optional context curation, applied mechanically after the effects.
    #[serde(default)]
    pub curation: Option<CurationDecision>,
    /// Durable facts to pin outside the narrative.
    #[serde(default)]
    pub constraints: Vec<ConstraintUpdate>,
    /// Question the next turn is expected to answer. `None` clears any
    /// outstanding one.
    #[serde(default)]
    pub pending_confirmation: Option<PendingConfirmation>,
    /// Opaque per-step outcome summaries from the execution plan.
    #[serde(default)]
    pub step_results: Vec<StepResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Steps were executed this turn.
    Execute,
    /// A plan is offered, awaiting approval.
    Propose,
    /// More information is needed before acting.
    Clarify,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Execute => "execute",
            DecisionKind::Propose => "propose",
            DecisionKind::Clarify => "clarify",
        }
    }
}

/// A record interaction reported by the collaborator. The registry turns
/// these into callsign bookkeeping; unknown refs surface as misses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum EntityEffect {
    /// A durable record was read, created, updated, deleted, or linked.
    Record {
        internal_id: String,
        kind: String,
        label: String,
        lifecycle: LifecycleState,
    },
    /// Content produced this turn with no durable identifier. The backend
    /// mints a draft id and a `gen_*` callsign for it.
    Generate {
        kind: String,
        label: String,
        content: serde_json::Value,
    },
    /// A generated artifact was saved; the durable layer assigned this id.
    Promote {
        gen_ref: String,
        internal_id: String,
    },
    /// A callsign was mentioned without any lifecycle change.
    Touch { ref_token: String },
}

/// A durable fact worth keeping outside the lossy narrative summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintUpdate {
    pub name: String,
    pub value: serde_json::Value,
    /// Turns until the fact stops applying; `None` means session lifetime.
    #[serde(default)]
    pub expires_in_turns: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingConfirmation {
    pub question: String,
    /// Callsigns the question is about.
    #[serde(default)]
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepResult {
    pub name: String,
    pub summary: String,
    pub ok: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /v1/summarize — request body.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRequest {
    pub session_id: String,
    /// Transcript chunk to fold away, oldest first.
    pub text: String,
    /// Existing summary the new one extends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_summary: Option<String>,
}

/// POST /v1/summarize — response body.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_a_minimal_body() {
        let raw = r#"{"assistant_text": "done", "decision_kind": "execute"}"#;
        let d: Decision = serde_json::from_str(raw).unwrap();
        assert_eq!(d.decision_kind, DecisionKind::Execute);
        assert!(d.effects.is_empty());
        assert!(d.curation.is_none());
    }

    #[test]
    fn decision_rejects_unknown_fields() {
        let raw = r#"{"assistant_text": "x", "decision_kind": "execute", "mood": "great"}"#;
        assert!(serde_json::from_str::<Decision>(raw).is_err());
    }

    #[test]
    fn effect_tags_dispatch_by_op() {
        let raw = r#"[
            {"op": "record", "internal_id": "rec-1", "kind": "recipe",
             "label": "Pasta", "lifecycle": "read"},
            {"op": "generate", "kind": "recipe", "label": "Taco",
             "content": {"steps": []}},
            {"op": "promote", "gen_ref": "gen_recipe_1", "internal_id": "rec-9"},
            {"op": "touch", "ref_token": "recipe_1"}
        ]"#;
        let effects: Vec<EntityEffect> = serde_json::from_str(raw).unwrap();
        assert_eq!(effects.len(), 4);
        assert!(matches!(effects[0], EntityEffect::Record { .. }));
        assert!(matches!(effects[3], EntityEffect::Touch { .. }));
    }

    #[test]
    fn constraint_update_defaults_to_session_lifetime() {
        let raw = r#"{"name": "servings", "value": 4}"#;
        let c: ConstraintUpdate = serde_json::from_str(raw).unwrap();
        assert!(c.expires_in_turns.is_none());
    }
}
