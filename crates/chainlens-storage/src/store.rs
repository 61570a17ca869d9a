//! Store traits — the seams between the processors and the backends.

use async_trait::async_trait;

use chainlens_core::types::{
    AccountCheckpoint, AccountSnapshot, BakerCheckpoint, BakerSnapshot, Block, FeeStats,
    OperationKind, OperationRow, ResetEvent, RightsRow, TnsEntry, TokenBalance, TokenTransfer,
};

use crate::error::StoreError;

/// Everything derived from one block, committed atomically with it.
#[derive(Debug, Clone)]
pub struct BlockWrite {
    pub block: Block,
    pub operations: Vec<OperationRow>,
    pub account_checkpoints: Vec<AccountCheckpoint>,
    pub baker_checkpoints: Vec<BakerCheckpoint>,
    pub token_transfers: Vec<TokenTransfer>,
    pub token_balances: Vec<TokenBalance>,
    pub tns_entries: Vec<TnsEntry>,
}

impl BlockWrite {
    pub fn for_block(block: Block) -> Self {
        Self {
            block,
            operations: vec![],
            account_checkpoints: vec![],
            baker_checkpoints: vec![],
            token_transfers: vec![],
            token_balances: vec![],
            tns_entries: vec![],
        }
    }
}

/// Block rows and everything that commits with them.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist a page of blocks and their dependent rows as one transaction.
    /// Partial commits are forbidden: either the whole page lands or none of
    /// it does. Replaying an already-committed page is a no-op and re-emits
    /// no checkpoint rows.
    ///
    /// Returns the number of newly committed blocks.
    async fn write_block_page(&self, page: &[BlockWrite]) -> Result<usize, StoreError>;

    /// Highest persisted level, `None` when nothing has been indexed.
    async fn max_level(&self) -> Result<Option<u64>, StoreError>;

    async fn block_exists(&self, hash: &str) -> Result<bool, StoreError>;

    async fn block_at_level(&self, level: u64) -> Result<Option<Block>, StoreError>;

    /// Release backend resources. Called once by the indexer's termination
    /// sequence; the default is a no-op.
    async fn close(&self) {}
}

/// Pending work rows for account/baker re-snapshotting.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn account_checkpoints(&self) -> Result<Vec<AccountCheckpoint>, StoreError>;

    async fn write_account_checkpoints(
        &self,
        rows: &[AccountCheckpoint],
    ) -> Result<(), StoreError>;

    /// Delete exactly `rows`. Rows inserted concurrently with the caller's
    /// read are left alone.
    async fn delete_account_checkpoints(
        &self,
        rows: &[AccountCheckpoint],
    ) -> Result<(), StoreError>;

    async fn baker_checkpoints(&self) -> Result<Vec<BakerCheckpoint>, StoreError>;

    async fn write_baker_checkpoints(&self, rows: &[BakerCheckpoint]) -> Result<(), StoreError>;

    async fn delete_baker_checkpoints(&self, rows: &[BakerCheckpoint]) -> Result<(), StoreError>;
}

/// Account snapshots.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn write_account_snapshots(&self, rows: &[AccountSnapshot]) -> Result<(), StoreError>;

    /// Every account id ever snapshotted. Used by the reset handler to fan
    /// out a wholesale refresh.
    async fn account_ids(&self) -> Result<Vec<String>, StoreError>;

    async fn account_snapshot(
        &self,
        account_id: &str,
        block_level: u64,
    ) -> Result<Option<AccountSnapshot>, StoreError>;
}

/// Baker snapshots.
#[async_trait]
pub trait BakerStore: Send + Sync {
    async fn write_baker_snapshots(&self, rows: &[BakerSnapshot]) -> Result<(), StoreError>;
}

/// Baking/endorsing rights.
#[async_trait]
pub trait RightsStore: Send + Sync {
    /// Insert-or-update by `(level, delegate, slot, kind)`.
    async fn upsert_rights(&self, rows: &[RightsRow]) -> Result<(), StoreError>;

    /// Replace `estimated_time` with the real block timestamp for every
    /// right whose block has since been indexed. Returns the number of rows
    /// touched.
    async fn backfill_rights_timestamps(&self) -> Result<u64, StoreError>;

    async fn rights_at_level(&self, level: u64) -> Result<Vec<RightsRow>, StoreError>;
}

/// Fee statistics and their operation-fee source data.
#[async_trait]
pub trait FeeStore: Send + Sync {
    /// The most recent `limit` fees for one operation kind, newest first.
    async fn recent_fees(&self, kind: OperationKind, limit: usize) -> Result<Vec<u64>, StoreError>;

    async fn write_fee_stats(&self, stats: &FeeStats) -> Result<(), StoreError>;

    async fn latest_fee_stats(&self, kind: OperationKind) -> Result<Option<FeeStats>, StoreError>;
}

/// Bookkeeping for applied protocol reset events.
#[async_trait]
pub trait ResetStore: Send + Sync {
    async fn applied_reset_levels(&self) -> Result<Vec<u64>, StoreError>;

    async fn mark_reset_applied(&self, event: &ResetEvent) -> Result<(), StoreError>;
}

/// The full store the indexer is wired against.
pub trait Store:
    BlockStore + CheckpointStore + AccountStore + BakerStore + RightsStore + FeeStore + ResetStore
{
}

impl<T> Store for T where
    T: BlockStore + CheckpointStore + AccountStore + BakerStore + RightsStore + FeeStore + ResetStore
{
}
