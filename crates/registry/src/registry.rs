use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use cs_domain::error::{Error, Result};

use crate::tiers::TierSet;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the session last interacted with an entity. Stored per entity and
/// rewritten by [`RefRegistry::mark_lifecycle`]; the latest interaction wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Read,
    Created,
    Updated,
    Deleted,
    /// Produced by the reasoner this session; no durable identifier yet.
    Generated,
    /// Attached to another entity rather than operated on directly.
    Linked,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Read => "read",
            LifecycleState::Created => "created",
            LifecycleState::Updated => "updated",
            LifecycleState::Deleted => "deleted",
            LifecycleState::Generated => "generated",
            LifecycleState::Linked => "linked",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One callsign-to-record binding. The binding itself is immutable once
/// minted; only the bookkeeping around it (lifecycle, touch turn,
/// retention) moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub internal_id: String,
    pub ref_token: String,
    pub kind: String,
    pub label: String,
    pub lifecycle: LifecycleState,
    pub turn_created: u32,
    pub turn_last_referenced: u32,
    /// Set only by an explicit retain instruction; cleared by demote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_reason: Option<String>,
    /// For a generated entity that was later saved: the plain ref the
    /// durable record got. The old mapping stays resolvable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    /// Dropped entities leave every tier but keep translating, so a late
    /// mention resolves for audit instead of failing.
    #[serde(default)]
    pub dropped: bool,
}

impl Entity {
    pub fn is_generated_unsaved(&self) -> bool {
        self.lifecycle == LifecycleState::Generated && self.superseded_by.is_none()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session-scoped two-way mapping between durable record identifiers and
/// short callsigns. Counters are per kind, with a separate sequence for
/// generated artifacts, so `recipe_2` and `gen_recipe_1` can coexist.
///
/// Serialized as part of the session state blob; everything here must
/// survive a round trip through JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefRegistry {
    entities: HashMap<String, Entity>,
    /// Mint order; the only iteration order used anywhere.
    order: Vec<String>,
    by_internal: HashMap<String, String>,
    counters: HashMap<String, u32>,
    gen_counters: HashMap<String, u32>,
    /// Raised by a clear_all curation. Entities last referenced before
    /// the floor read as dormant regardless of the active window.
    #[serde(default)]
    visibility_floor: u32,
}

/// Result of a batch translation: resolves what it can, names what it
/// cannot. Never fails as a whole.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchTranslation {
    pub found: BTreeMap<String, String>,
    pub missing: Vec<String>,
}

impl RefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a durable record to a callsign, minting one if this is the
    /// first sight of `internal_id`. Idempotent per internal id: a repeat
    /// registration refreshes label, lifecycle, and touch turn, and hands
    /// back the ref already assigned.
    pub fn register(
        &mut self,
        internal_id: &str,
        kind: &str,
        label: &str,
        lifecycle: LifecycleState,
        current_turn: u32,
    ) -> Result<String> {
        if let Some(token) = self.by_internal.get(internal_id).cloned() {
            if let Some(entity) = self.entities.get_mut(&token) {
                entity.label = label.to_string();
                entity.lifecycle = lifecycle;
                entity.turn_last_referenced = current_turn;
            }
            return Ok(token);
        }

        let token = self.mint_token(kind, lifecycle == LifecycleState::Generated);
        if self.entities.contains_key(&token) {
            // Counters only move forward, so a collision means the state
            // blob was edited out from under us.
            return Err(Error::DuplicateRef {
                ref_token: token.clone(),
                internal_id: self.entities[&token].internal_id.clone(),
            });
        }

        tracing::debug!(ref_token = %token, internal_id, kind, "minted ref");
        self.entities.insert(
            token.clone(),
            Entity {
                internal_id: internal_id.to_string(),
                ref_token: token.clone(),
                kind: kind.to_string(),
                label: label.to_string(),
                lifecycle,
                turn_created: current_turn,
                turn_last_referenced: current_turn,
                retention_reason: None,
                superseded_by: None,
                dropped: false,
            },
        );
        self.order.push(token.clone());
        self.by_internal
            .insert(internal_id.to_string(), token.clone());
        Ok(token)
    }

    fn mint_token(&mut self, kind: &str, generated: bool) -> String {
        let counters = if generated {
            &mut self.gen_counters
        } else {
            &mut self.counters
        };
        let n = counters.entry(kind.to_string()).or_insert(0);
        *n += 1;
        if generated {
            format!("gen_{kind}_{n}")
        } else {
            format!("{kind}_{n}")
        }
    }

    /// Resolve a callsign back to the durable identifier. Unknown refs are
    /// an [`Error::UnknownRef`]; the caller reports "not in the current
    /// context" rather than guessing.
    pub fn translate_to_internal(&self, ref_token: &str) -> Result<&str> {
        self.entities
            .get(ref_token)
            .map(|e| e.internal_id.as_str())
            .ok_or_else(|| Error::UnknownRef {
                ref_token: ref_token.to_string(),
            })
    }

    /// Translate many refs at once with partial success.
    pub fn translate_batch<S: AsRef<str>>(&self, refs: &[S]) -> BatchTranslation {
        let mut out = BatchTranslation::default();
        for r in refs {
            let token = r.as_ref();
            match self.entities.get(token) {
                Some(e) => {
                    out.found
                        .insert(token.to_string(), e.internal_id.clone());
                }
                None => out.missing.push(token.to_string()),
            }
        }
        out
    }

    /// Record an interaction that changed (or reread) the entity.
    pub fn mark_lifecycle(
        &mut self,
        ref_token: &str,
        state: LifecycleState,
        current_turn: u32,
    ) -> Result<()> {
        let entity = self.get_mut(ref_token)?;
        entity.lifecycle = state;
        entity.turn_last_referenced = current_turn;
        Ok(())
    }

    /// Record a mention without a lifecycle change.
    pub fn touch(&mut self, ref_token: &str, current_turn: u32) -> Result<()> {
        let entity = self.get_mut(ref_token)?;
        entity.turn_last_referenced = current_turn;
        Ok(())
    }

    /// A generated artifact was saved: mint the plain ref its durable
    /// record answers to from now on, and leave a superseded marker on the
    /// generated one. Calling again for an already-promoted ref returns
    /// the successor it got the first time.
    pub fn promote(
        &mut self,
        gen_ref: &str,
        internal_id: &str,
        current_turn: u32,
    ) -> Result<String> {
        let (kind, label, existing_successor) = {
            let entity = self.get(gen_ref).ok_or_else(|| Error::UnknownRef {
                ref_token: gen_ref.to_string(),
            })?;
            (
                entity.kind.clone(),
                entity.label.clone(),
                entity.superseded_by.clone(),
            )
        };
        if let Some(successor) = existing_successor {
            return Ok(successor);
        }

        let successor = match self.by_internal.get(internal_id).cloned() {
            // The durable id is already known under another callsign; the
            // save raced a read. Reuse that binding.
            Some(token) => token,
            None => self.register(
                internal_id,
                &kind,
                &label,
                LifecycleState::Created,
                current_turn,
            )?,
        };

        if let Ok(old) = self.get_mut(gen_ref) {
            old.superseded_by = Some(successor.clone());
            old.turn_last_referenced = current_turn;
        }
        Ok(successor)
    }

    fn get_mut(&mut self, ref_token: &str) -> Result<&mut Entity> {
        self.entities
            .get_mut(ref_token)
            .ok_or_else(|| Error::UnknownRef {
                ref_token: ref_token.to_string(),
            })
    }

    // ── read access ─────────────────────────────────────────────────

    pub fn get(&self, ref_token: &str) -> Option<&Entity> {
        self.entities.get(ref_token)
    }

    pub fn ref_for_internal(&self, internal_id: &str) -> Option<&str> {
        self.by_internal.get(internal_id).map(String::as_str)
    }

    pub fn contains(&self, ref_token: &str) -> bool {
        self.entities.contains_key(ref_token)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in mint order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|t| self.entities.get(t))
    }

    pub fn visibility_floor(&self) -> u32 {
        self.visibility_floor
    }

    pub(crate) fn set_visibility_floor(&mut self, turn: u32) {
        self.visibility_floor = turn;
    }

    pub(crate) fn entity_mut(&mut self, ref_token: &str) -> Option<&mut Entity> {
        self.entities.get_mut(ref_token)
    }

    // ── projection ──────────────────────────────────────────────────

    /// Render the tier partition for the reasoning collaborator. Dormant
    /// entities are deliberately absent: known to the session, invisible
    /// to the reasoner until something touches them again.
    pub fn format_for_consumer(&self, tiers: &TierSet, verbosity: Verbosity) -> String {
        let mut out = String::new();
        let sections: [(&str, &[String]); 3] = [
            ("active", &tiers.active),
            ("retained", &tiers.retained),
            ("generated (unsaved)", &tiers.generated_unsaved),
        ];
        for (title, refs) in sections {
            if refs.is_empty() {
                continue;
            }
            match verbosity {
                Verbosity::RefsOnly => {
                    out.push_str(&format!("{title}: {}\n", refs.join(", ")));
                }
                Verbosity::Full => {
                    out.push_str(&format!("## {title}\n"));
                    for token in refs {
                        if let Some(e) = self.entities.get(token) {
                            out.push_str(&format!(
                                "- {} [{}] \"{}\" ({}, turn {})",
                                e.ref_token,
                                e.kind,
                                e.label,
                                e.lifecycle.as_str(),
                                e.turn_last_referenced,
                            ));
                            if let Some(reason) = &e.retention_reason {
                                out.push_str(&format!("; retained: {reason}"));
                            }
                            out.push('\n');
                        }
                    }
                }
            }
        }
        out
    }
}

/// How much detail the formatted projection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    RefsOnly,
    Full,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
