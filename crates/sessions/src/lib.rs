//! Session state for Callsign.
//!
//! A session is one long-lived conversation: its turn history, the
//! entities the user has referred to, generated drafts, and active
//! constraints. This crate owns the whole-state snapshot model, the
//! turn history with background compression, and the commit/load path
//! over durable JSON storage.

pub mod durable;
pub mod history;
pub mod state;
pub mod store;

pub use durable::{JsonFileBackend, SessionBackend};
pub use history::{CompressReport, TurnHistory};
pub use state::{Constraint, SessionState, Turn};
pub use store::{SessionOverview, SessionStateStore, SessionStatus};
