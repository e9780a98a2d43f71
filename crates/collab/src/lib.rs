//! `cs-collab` — collaborator interfaces for Callsign.
//!
//! The reasoning step and the summarization step are external services.
//! This crate holds the traits the rest of the system programs against
//! ([`TurnReasoner`], [`Summarizer`]), the wire types for both calls, and
//! the production REST implementation ([`RestCollaborator`]) with retry +
//! back-off.

pub mod provider;
pub mod rest;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use provider::{Summarizer, TurnReasoner};
pub use rest::{from_reqwest, RestCollaborator};
pub use types::{
    ConstraintUpdate, Decision, DecisionKind, EntityEffect, PendingConfirmation, StepResult,
    SummaryRequest, SummaryResponse, TurnContext,
};
