use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use cs_domain::config::ContextConfig;

use crate::registry::RefRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier partition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read-only partition of a session's entities. Every non-dropped entity
/// lands in exactly one tier; refs appear in mint order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TierSet {
    /// Referenced within the active window.
    pub active: Vec<String>,
    /// Outside the window but pinned by an explicit retain.
    pub retained: Vec<String>,
    /// Generated this session with no durable id yet. Sticky: age never
    /// demotes these, because the ref is the only route to the content.
    pub generated_unsaved: Vec<String>,
    /// Known to the session, invisible to the reasoner by default.
    pub dormant: Vec<String>,
}

/// Partition with an explicit window size. The window boundary is
/// inclusive: touched at turn `t`, an entity stays active through
/// `t + window`.
pub fn classify_with_window(reg: &RefRegistry, current_turn: u32, window: u32) -> TierSet {
    let floor = reg.visibility_floor();
    let mut tiers = TierSet::default();
    for e in reg.iter() {
        if e.dropped {
            continue;
        }
        let below_floor = e.turn_last_referenced < floor;
        if e.is_generated_unsaved() && !below_floor {
            tiers.generated_unsaved.push(e.ref_token.clone());
        } else if !below_floor && e.turn_last_referenced + window >= current_turn {
            tiers.active.push(e.ref_token.clone());
        } else if e.retention_reason.is_some() {
            tiers.retained.push(e.ref_token.clone());
        } else {
            tiers.dormant.push(e.ref_token.clone());
        }
    }
    tiers
}

/// Partition using the configured window, with the dormant list capped to
/// `max_projected_entities` (oldest elided first).
pub fn classify(reg: &RefRegistry, current_turn: u32, cfg: &ContextConfig) -> TierSet {
    let mut tiers = classify_with_window(reg, current_turn, cfg.active_window_turns);
    if tiers.dormant.len() > cfg.max_projected_entities {
        let excess = tiers.dormant.len() - cfg.max_projected_entities;
        tiers.dormant.drain(..excess);
    }
    tiers
}

/// The set of refs the reasoner sees without asking: the active tier.
pub fn active_window(reg: &RefRegistry, current_turn: u32, window: u32) -> BTreeSet<String> {
    classify_with_window(reg, current_turn, window)
        .active
        .into_iter()
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Curation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Context curation instructions produced by the reasoner. Untrusted
/// input: the shape is enforced on deserialization and every ref is
/// treated as a claim to verify, not a fact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurationDecision {
    #[serde(default)]
    pub retain: Vec<RetainInstruction>,
    #[serde(default)]
    pub demote: Vec<String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub clear_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetainInstruction {
    pub ref_token: String,
    pub reason: String,
}

impl CurationDecision {
    pub fn is_empty(&self) -> bool {
        self.retain.is_empty() && self.demote.is_empty() && self.drop.is_empty() && !self.clear_all
    }
}

/// What a curation pass actually did. Unknown refs and rejected
/// instructions are reported, never fatal: a confused reasoner must not
/// be able to fail a turn through curation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CurationOutcome {
    pub retained: Vec<String>,
    pub demoted: Vec<String>,
    pub dropped: Vec<String>,
    pub cleared_all: bool,
    pub unknown_refs: Vec<String>,
    pub rejected: Vec<String>,
}

/// Apply a curation decision mechanically. `clear_all` runs first so a
/// retain in the same decision can pin an entity past the reset.
pub fn apply_curation(
    reg: &mut RefRegistry,
    decision: &CurationDecision,
    current_turn: u32,
) -> CurationOutcome {
    let mut outcome = CurationOutcome::default();

    if decision.clear_all {
        let tokens: Vec<String> = reg.iter().map(|e| e.ref_token.clone()).collect();
        for token in tokens {
            if let Some(e) = reg.entity_mut(&token) {
                e.retention_reason = None;
            }
        }
        reg.set_visibility_floor(current_turn);
        outcome.cleared_all = true;
    }

    for instr in &decision.retain {
        if instr.reason.trim().is_empty() {
            outcome
                .rejected
                .push(format!("retain {}: reason is required", instr.ref_token));
            continue;
        }
        match reg.entity_mut(&instr.ref_token) {
            Some(e) => {
                e.retention_reason = Some(instr.reason.clone());
                outcome.retained.push(instr.ref_token.clone());
            }
            None => outcome.unknown_refs.push(instr.ref_token.clone()),
        }
    }

    for token in &decision.demote {
        match reg.entity_mut(token) {
            Some(e) => {
                e.retention_reason = None;
                outcome.demoted.push(token.clone());
            }
            None => outcome.unknown_refs.push(token.clone()),
        }
    }

    for token in &decision.drop {
        match reg.entity_mut(token) {
            Some(e) => {
                e.dropped = true;
                e.retention_reason = None;
                outcome.dropped.push(token.clone());
            }
            None => outcome.unknown_refs.push(token.clone()),
        }
    }

    outcome
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
