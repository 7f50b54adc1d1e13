//! Driftmere engine library.
//!
//! The binary in `main.rs` wires configuration and the repository
//! collaborator to this library; everything testable lives here.

pub mod api;
pub mod app;
pub mod config;
pub mod cycle;
pub mod infrastructure;
pub mod pathfinder;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_fixtures;
