//! In-memory storage backend.
//!
//! Keeps the full indexed state in RAM with the same key semantics as the
//! Postgres backend. Used by the test suite and by short-lived runs that do
//! not need persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chainlens_core::types::{
    AccountCheckpoint, AccountSnapshot, BakerCheckpoint, BakerSnapshot, Block, FeeStats,
    OperationKind, OperationRow, ResetEvent, RightsKind, RightsRow, TnsEntry, TokenBalance,
    TokenTransfer,
};

use crate::error::StoreError;
use crate::store::{
    AccountStore, BakerStore, BlockStore, BlockWrite, CheckpointStore, FeeStore, ResetStore,
    RightsStore,
};

type RightsKey = (u64, String, u32, RightsKind);

/// In-memory store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
    operations: Mutex<Vec<OperationRow>>,
    account_checkpoints: Mutex<HashSet<AccountCheckpoint>>,
    baker_checkpoints: Mutex<HashSet<BakerCheckpoint>>,
    accounts: Mutex<HashMap<(String, u64), AccountSnapshot>>,
    bakers: Mutex<HashMap<(String, u64), BakerSnapshot>>,
    rights: Mutex<HashMap<RightsKey, RightsRow>>,
    fees: Mutex<Vec<FeeStats>>,
    token_transfers: Mutex<Vec<TokenTransfer>>,
    token_balances: Mutex<Vec<TokenBalance>>,
    tns_entries: Mutex<HashMap<String, TnsEntry>>,
    applied_resets: Mutex<HashMap<u64, ResetEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Test-facing accessors.

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.lock().unwrap().len()
    }

    pub fn persisted_levels(&self) -> Vec<u64> {
        self.blocks.lock().unwrap().keys().copied().collect()
    }

    pub fn account_checkpoint_count(&self) -> usize {
        self.account_checkpoints.lock().unwrap().len()
    }

    pub fn token_transfer_count(&self) -> usize {
        self.token_transfers.lock().unwrap().len()
    }

    pub fn tns_entry(&self, name: &str) -> Option<TnsEntry> {
        self.tns_entries.lock().unwrap().get(name).cloned()
    }

    pub fn all_rights(&self) -> Vec<RightsRow> {
        let mut rows: Vec<_> = self.rights.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| (a.level, a.slot).cmp(&(b.level, b.slot)));
        rows
    }

    pub fn snapshot_levels(&self, account_id: &str) -> Vec<u64> {
        let mut levels: Vec<u64> = self
            .accounts
            .lock()
            .unwrap()
            .keys()
            .filter(|(id, _)| id == account_id)
            .map(|(_, level)| *level)
            .collect();
        levels.sort_unstable();
        levels
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn write_block_page(&self, page: &[BlockWrite]) -> Result<usize, StoreError> {
        // Validate the whole page before mutating anything — the backend
        // contract forbids partial commits.
        {
            let blocks = self.blocks.lock().unwrap();
            for write in page {
                if let Some(existing) = blocks.get(&write.block.level) {
                    if existing.hash != write.block.hash {
                        return Err(StoreError::Conflict(format!(
                            "level {} already holds {}, refusing {}",
                            write.block.level, existing.hash, write.block.hash
                        )));
                    }
                }
            }
        }

        let mut committed = 0usize;
        for write in page {
            {
                let blocks = self.blocks.lock().unwrap();
                if blocks.contains_key(&write.block.level) {
                    // Already committed with its dependent rows; replay is a
                    // no-op and re-emits nothing.
                    continue;
                }
            }
            committed += 1;
            self.blocks
                .lock()
                .unwrap()
                .insert(write.block.level, write.block.clone());
            self.operations
                .lock()
                .unwrap()
                .extend(write.operations.iter().cloned());
            self.account_checkpoints
                .lock()
                .unwrap()
                .extend(write.account_checkpoints.iter().cloned());
            self.baker_checkpoints
                .lock()
                .unwrap()
                .extend(write.baker_checkpoints.iter().cloned());
            self.token_transfers
                .lock()
                .unwrap()
                .extend(write.token_transfers.iter().cloned());
            self.token_balances
                .lock()
                .unwrap()
                .extend(write.token_balances.iter().cloned());
            let mut tns = self.tns_entries.lock().unwrap();
            for e in &write.tns_entries {
                tns.insert(e.name.clone(), e.clone());
            }
        }
        Ok(committed)
    }

    async fn max_level(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.blocks.lock().unwrap().keys().next_back().copied())
    }

    async fn block_exists(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.blocks.lock().unwrap().values().any(|b| b.hash == hash))
    }

    async fn block_at_level(&self, level: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.lock().unwrap().get(&level).cloned())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn account_checkpoints(&self) -> Result<Vec<AccountCheckpoint>, StoreError> {
        let mut rows: Vec<_> = self.account_checkpoints.lock().unwrap().iter().cloned().collect();
        rows.sort_by(|a, b| (&a.account_id, a.block_level).cmp(&(&b.account_id, b.block_level)));
        Ok(rows)
    }

    async fn write_account_checkpoints(
        &self,
        rows: &[AccountCheckpoint],
    ) -> Result<(), StoreError> {
        self.account_checkpoints
            .lock()
            .unwrap()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_account_checkpoints(
        &self,
        rows: &[AccountCheckpoint],
    ) -> Result<(), StoreError> {
        let mut set = self.account_checkpoints.lock().unwrap();
        for row in rows {
            set.remove(row);
        }
        Ok(())
    }

    async fn baker_checkpoints(&self) -> Result<Vec<BakerCheckpoint>, StoreError> {
        let mut rows: Vec<_> = self.baker_checkpoints.lock().unwrap().iter().cloned().collect();
        rows.sort_by(|a, b| (&a.delegate, a.block_level).cmp(&(&b.delegate, b.block_level)));
        Ok(rows)
    }

    async fn write_baker_checkpoints(&self, rows: &[BakerCheckpoint]) -> Result<(), StoreError> {
        self.baker_checkpoints
            .lock()
            .unwrap()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_baker_checkpoints(&self, rows: &[BakerCheckpoint]) -> Result<(), StoreError> {
        let mut set = self.baker_checkpoints.lock().unwrap();
        for row in rows {
            set.remove(row);
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn write_account_snapshots(&self, rows: &[AccountSnapshot]) -> Result<(), StoreError> {
        let mut map = self.accounts.lock().unwrap();
        for s in rows {
            map.insert((s.account_id.clone(), s.block_level), s.clone());
        }
        Ok(())
    }

    async fn account_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .accounts
            .lock()
            .unwrap()
            .keys()
            .map(|(id, _)| id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn account_snapshot(
        &self,
        account_id: &str,
        block_level: u64,
    ) -> Result<Option<AccountSnapshot>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&(account_id.to_string(), block_level))
            .cloned())
    }
}

#[async_trait]
impl BakerStore for MemoryStore {
    async fn write_baker_snapshots(&self, rows: &[BakerSnapshot]) -> Result<(), StoreError> {
        let mut map = self.bakers.lock().unwrap();
        for s in rows {
            map.insert((s.delegate.clone(), s.block_level), s.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RightsStore for MemoryStore {
    async fn upsert_rights(&self, rows: &[RightsRow]) -> Result<(), StoreError> {
        let mut map = self.rights.lock().unwrap();
        for r in rows {
            let key = (r.level, r.delegate.clone(), r.slot, r.kind);
            match map.get_mut(&key) {
                Some(existing) => {
                    existing.cycle = r.cycle;
                    if r.estimated_time.is_some() {
                        existing.estimated_time = r.estimated_time;
                    }
                }
                None => {
                    map.insert(key, r.clone());
                }
            }
        }
        Ok(())
    }

    async fn backfill_rights_timestamps(&self) -> Result<u64, StoreError> {
        let blocks = self.blocks.lock().unwrap();
        let mut rights = self.rights.lock().unwrap();
        let mut touched = 0u64;
        for right in rights.values_mut() {
            if let Some(block) = blocks.get(&right.level) {
                if right.estimated_time != Some(block.timestamp) {
                    right.estimated_time = Some(block.timestamp);
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn rights_at_level(&self, level: u64) -> Result<Vec<RightsRow>, StoreError> {
        let mut rows: Vec<_> = self
            .rights
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.level == level)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.kind.as_str(), a.slot).cmp(&(b.kind.as_str(), b.slot)));
        Ok(rows)
    }
}

#[async_trait]
impl FeeStore for MemoryStore {
    async fn recent_fees(&self, kind: OperationKind, limit: usize) -> Result<Vec<u64>, StoreError> {
        let ops = self.operations.lock().unwrap();
        let mut with_fee: Vec<&OperationRow> = ops
            .iter()
            .filter(|op| op.kind == kind && op.fee.is_some())
            .collect();
        with_fee.sort_by(|a, b| (b.block_level, b.op_index).cmp(&(a.block_level, a.op_index)));
        Ok(with_fee
            .into_iter()
            .take(limit)
            .filter_map(|op| op.fee)
            .collect())
    }

    async fn write_fee_stats(&self, stats: &FeeStats) -> Result<(), StoreError> {
        self.fees.lock().unwrap().push(stats.clone());
        Ok(())
    }

    async fn latest_fee_stats(&self, kind: OperationKind) -> Result<Option<FeeStats>, StoreError> {
        Ok(self
            .fees
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.kind == kind)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }
}

#[async_trait]
impl ResetStore for MemoryStore {
    async fn applied_reset_levels(&self) -> Result<Vec<u64>, StoreError> {
        let mut levels: Vec<u64> = self.applied_resets.lock().unwrap().keys().copied().collect();
        levels.sort_unstable();
        Ok(levels)
    }

    async fn mark_reset_applied(&self, event: &ResetEvent) -> Result<(), StoreError> {
        self.applied_resets
            .lock()
            .unwrap()
            .entry(event.activation_level)
            .or_insert_with(|| event.clone());
        Ok(())
    }
}
