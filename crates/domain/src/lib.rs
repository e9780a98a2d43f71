//! Shared domain types for Callsign.
//!
//! Home of the cross-crate error type, the structured trace events, and
//! the layered TOML configuration with validation.

pub mod config;
pub mod error;
pub mod trace;

pub use error::{Error, Result};
pub use trace::TraceEvent;
