//! Core data models for curator.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees (roles, amounts)
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants with retry classification

mod amount;
mod config;
mod error;
mod post;

pub use amount::*;
pub use config::*;
pub use error::*;
pub use post::*;
