//! # chainlens-indexer
//!
//! The ingestion pipeline: plans which blocks to fetch, commits them page by
//! page with their dependent rows, reconciles account/baker state from
//! checkpoints, maintains baking/endorsing rights and fee statistics, and
//! drives it all from a resumable main loop.

pub mod accounts;
pub mod blocks;
pub mod error;
pub mod fees;
pub mod index_loop;
pub mod mappers;
pub mod planner;
pub mod resets;
pub mod rights;
pub mod tns;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use accounts::{AccountsProcessor, BakersProcessor};
pub use blocks::BlocksProcessor;
pub use error::ProcessingError;
pub use fees::FeeAggregator;
pub use index_loop::IndexerLoop;
pub use planner::{plan, FetchPlan};
pub use resets::AccountsResetHandler;
pub use rights::RightsProcessor;
pub use tokens::TokenRegistry;
