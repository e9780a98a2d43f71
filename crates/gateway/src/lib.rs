//! Callsign gateway: the HTTP surface and job runtime over the session,
//! registry, and collaborator crates.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
