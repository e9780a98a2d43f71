//! Session-scoped reference registry for Callsign.
//!
//! Durable records are never shown to the reasoning collaborator by raw
//! identifier. Each one gets a short session-scoped callsign (`recipe_1`,
//! `gen_recipe_2`, ...) minted on first sight and translated back at the
//! execution boundary. The tier classifier decides which callsigns a turn
//! actually surfaces.

pub mod registry;
pub mod tiers;

pub use registry::{BatchTranslation, Entity, LifecycleState, RefRegistry, Verbosity};
pub use tiers::{
    active_window, apply_curation, classify, classify_with_window, CurationDecision,
    CurationOutcome, RetainInstruction, TierSet,
};
