//! # chainlens-rpc
//!
//! The node client used by the ingestion pipeline.
//!
//! Features:
//! - Per-call deadline with automatic retry + exponential backoff for
//!   transient failures
//! - Paged block-range fetching with bounded request fanout
//! - Distinct network vs. decode failure classification

pub mod client;
pub mod error;
pub mod node;

pub use client::TezosNodeClient;
pub use error::NodeError;
pub use node::{AccountData, BlockData, BlockRef, LevelRange, NodeRpc};
