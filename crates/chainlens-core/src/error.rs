//! Startup-time error types.
//!
//! The runtime taxonomy is spread over the crates that produce it: the node
//! client distinguishes network and decode failures, the processors wrap
//! their causes with context, and the API layer maps everything to status
//! codes. Only configuration errors live here — they are fatal before any
//! of those layers exist.

use thiserror::Error;

/// A fatal configuration problem detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    #[error("could not read configuration at {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
