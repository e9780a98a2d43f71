//! Collaborator traits: the reasoning step and the summarization step.
//!
//! Implementations may talk to the real HTTP services or be test doubles.
//! All methods return `cs_domain::error::Result`.

use async_trait::async_trait;
use cs_domain::error::Result;

use crate::types::{Decision, SummaryRequest, TurnContext};

/// The reasoning collaborator: given everything the backend can say about
/// a turn, produce a decision (POST /v1/decide).
///
/// The backend trusts nothing in the response beyond its shape. Effects
/// referencing unknown callsigns resolve to misses, not panics.
#[async_trait]
pub trait TurnReasoner: Send + Sync {
    async fn decide(&self, ctx: TurnContext) -> Result<Decision>;
}

/// The summarization collaborator (POST /v1/summarize).
///
/// Contract: the returned text is narrative only. Durable identifiers
/// must not appear in it; the registry is the sole identifier authority,
/// and numeric facts belong in constraints, not prose.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, req: SummaryRequest) -> Result<String>;
}
