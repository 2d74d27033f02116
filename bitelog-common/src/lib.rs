//! Shared types for the bitelog sync tooling
//!
//! Holds the pieces both the sync binary and any future consumer need:
//! the snapshot record model, the common error type, and configuration
//! resolution.

pub mod config;
pub mod error;
pub mod record;

pub use crate::error::{Error, Result};
pub use crate::record::Restaurant;
