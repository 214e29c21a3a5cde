//! Gridline Core - Foundational types for the Gridline compliance engine
//!
//! This crate provides the types that all other Gridline crates depend on:
//! - `GridlineError`, `ConfigError` - Error taxonomy and Result alias
//! - `Location` - File/line positions used by tokens and verdicts
//! - `CancellationToken` - Cooperative cancellation for the fix loop

mod cancel;
mod error;
mod location;

pub use cancel::CancellationToken;
pub use error::{ConfigError, GridlineError, Result};
pub use location::Location;
