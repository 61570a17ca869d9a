//! # chainlens-storage
//!
//! Persistence for the indexed chain data.
//!
//! The processors talk to the [`store::Store`] seam; backends are
//! [`postgres::PostgresStore`] for production and [`memory::MemoryStore`]
//! for tests and ephemeral runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::{PostgresOptions, PostgresStore};
pub use store::{
    AccountStore, BakerStore, BlockStore, BlockWrite, CheckpointStore, FeeStore, ResetStore,
    RightsStore, Store,
};
