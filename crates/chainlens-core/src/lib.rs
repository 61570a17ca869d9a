//! # chainlens-core
//!
//! Shared domain types, configuration, and the error taxonomy used across
//! the chainlens indexing pipeline and query API.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{BatchConfig, FetchDepth, LorreConfig, NetworkConfig, NodeConfig};
pub use error::ConfigError;
