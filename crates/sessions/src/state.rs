//! The session state blob: everything a conversation owns, serialized as
//! one JSON document per session.
//!
//! Mutation discipline: during a turn the pipeline works on a private
//! copy; only [`crate::store::SessionStateStore::commit`] makes a copy
//! durable, and only after the whole turn succeeded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cs_collab::{DecisionKind, PendingConfirmation, StepResult};
use cs_registry::RefRegistry;

use crate::history::TurnHistory;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One exchange. Text stays verbatim until history compression folds the
/// turn into the summary, at which point the text is blanked and only the
/// bookkeeping fields remain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based position in the session.
    pub index: u32,
    pub user_text: String,
    pub assistant_text: String,
    /// Callsigns touched while executing this turn.
    #[serde(default)]
    pub entities_touched: Vec<String>,
    pub decision_kind: DecisionKind,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    pub at: DateTime<Utc>,
    /// Set when the verbatim text was folded into the history summary.
    #[serde(default)]
    pub compressed: bool,
}

impl Turn {
    pub fn new(
        index: u32,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
        decision_kind: DecisionKind,
    ) -> Self {
        Self {
            index,
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            entities_touched: Vec::new(),
            decision_kind,
            step_results: Vec::new(),
            at: Utc::now(),
            compressed: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constraints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A durable fact pinned outside the narrative summary, so compression
/// can never garble it. Numeric and temporal facts belong here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub value: serde_json::Value,
    pub source_turn: u32,
    /// Last turn (inclusive) at which the fact still applies; `None`
    /// means the whole session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_turn: Option<u32>,
}

impl Constraint {
    pub fn applies_at(&self, turn: u32) -> bool {
        match self.expires_at_turn {
            Some(limit) => turn <= limit,
            None => true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub history: TurnHistory,
    pub entities: RefRegistry,
    /// Generated content by `gen_*` callsign. Exists only here until
    /// saved; a promote moves it into the durable record and out of the
    /// session.
    #[serde(default)]
    pub drafts: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmation>,
    #[serde(default)]
    pub constraints: HashMap<String, Constraint>,
    pub created_at: DateTime<Utc>,
    /// Stamped by `commit` and nothing else, only on a successful turn.
    pub last_active_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            history: TurnHistory::default(),
            entities: RefRegistry::new(),
            drafts: HashMap::new(),
            pending_confirmation: None,
            constraints: HashMap::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Index the next appended turn will get.
    pub fn next_turn_index(&self) -> u32 {
        self.history.turn_count() as u32 + 1
    }

    /// Pin a fact. An update under an existing name replaces it.
    pub fn set_constraint(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
        source_turn: u32,
        expires_in_turns: Option<u32>,
    ) {
        self.constraints.insert(
            name.into(),
            Constraint {
                value,
                source_turn,
                expires_at_turn: expires_in_turns.map(|n| source_turn + n),
            },
        );
    }

    /// Drop facts whose window has passed.
    pub fn prune_expired_constraints(&mut self, current_turn: u32) {
        self.constraints.retain(|_, c| c.applies_at(current_turn));
    }

    /// Constraints in effect at a turn, sorted by name for stable output.
    pub fn constraints_at(&self, turn: u32) -> Vec<(&str, &Constraint)> {
        let mut out: Vec<_> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.applies_at(turn))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
