//! # kairos-types
//!
//! Shared error types, identifiers and default constants for the kairos
//! adaptive time-stepping engine.
//!
//! This crate has zero numerical logic. It defines the vocabulary that
//! all other kairos crates share.

pub mod constants;
pub mod error;
pub mod ids;

pub use error::{KairosError, KairosResult};
pub use ids::VariableId;
