//! Account and baker checkpoint consumers.
//!
//! Pending checkpoint rows collapse to the latest row per id; states are
//! fetched in bounded batches and persisted as snapshots. Only the rows
//! that were read (and thus collapsed) are deleted afterwards — rows
//! inserted concurrently stay pending for the next run. A node failure
//! surfaces without touching the checkpoint table.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use chainlens_rpc::node::NodeRpc;
use chainlens_storage::{AccountStore as _, BakerStore as _, CheckpointStore as _, Store};

use crate::error::ProcessingError;
use crate::mappers;

/// Collapse checkpoint rows to the latest level per id.
fn collapse_latest<'a>(rows: impl Iterator<Item = (&'a str, u64)>) -> HashMap<&'a str, u64> {
    let mut latest: HashMap<&str, u64> = HashMap::new();
    for (id, level) in rows {
        latest
            .entry(id)
            .and_modify(|l| *l = (*l).max(level))
            .or_insert(level);
    }
    latest
}

/// Group collapsed ids by their target level.
fn group_by_level(latest: HashMap<&str, u64>) -> Vec<(u64, Vec<String>)> {
    let mut by_level: HashMap<u64, Vec<String>> = HashMap::new();
    for (id, level) in latest {
        by_level.entry(level).or_default().push(id.to_string());
    }
    let mut grouped: Vec<(u64, Vec<String>)> = by_level.into_iter().collect();
    grouped.sort_by_key(|(level, _)| *level);
    for (_, ids) in &mut grouped {
        ids.sort();
    }
    grouped
}

// ─── Accounts ────────────────────────────────────────────────────────────────

pub struct AccountsProcessor {
    store: Arc<dyn Store>,
    node: Arc<dyn NodeRpc>,
    batch_size: usize,
}

impl AccountsProcessor {
    pub fn new(store: Arc<dyn Store>, node: Arc<dyn NodeRpc>, batch_size: usize) -> Self {
        Self {
            store,
            node,
            batch_size: batch_size.max(1),
        }
    }

    /// Consume every pending account checkpoint. Returns the number of
    /// snapshots written.
    pub async fn process_checkpoint(&self) -> Result<usize, ProcessingError> {
        let rows = self
            .store
            .account_checkpoints()
            .await
            .map_err(|e| ProcessingError::accounts("reading checkpoints", e))?;
        if rows.is_empty() {
            return Ok(0);
        }

        let latest = collapse_latest(rows.iter().map(|r| (r.account_id.as_str(), r.block_level)));
        debug!(
            pending = rows.len(),
            collapsed = latest.len(),
            "processing account checkpoints"
        );

        let mut snapshots = Vec::with_capacity(latest.len());
        for (level, ids) in group_by_level(latest) {
            for chunk in ids.chunks(self.batch_size) {
                let states = self
                    .node
                    .get_accounts_at(level, chunk)
                    .await
                    .map_err(|e| {
                        ProcessingError::accounts(format!("fetching states at level {level}"), e)
                    })?;
                snapshots.extend(
                    states
                        .iter()
                        .map(|(id, data)| mappers::account_snapshot(id, level, data)),
                );
            }
        }

        self.store
            .write_account_snapshots(&snapshots)
            .await
            .map_err(|e| ProcessingError::accounts("writing snapshots", e))?;

        // Delete exactly what was read; concurrent inserts survive.
        self.store
            .delete_account_checkpoints(&rows)
            .await
            .map_err(|e| ProcessingError::accounts("deleting consumed checkpoints", e))?;

        info!(count = snapshots.len(), "account snapshots written");
        Ok(snapshots.len())
    }
}

// ─── Bakers ──────────────────────────────────────────────────────────────────

pub struct BakersProcessor {
    store: Arc<dyn Store>,
    node: Arc<dyn NodeRpc>,
    batch_size: usize,
}

impl BakersProcessor {
    pub fn new(store: Arc<dyn Store>, node: Arc<dyn NodeRpc>, batch_size: usize) -> Self {
        Self {
            store,
            node,
            batch_size: batch_size.max(1),
        }
    }

    /// Consume every pending baker checkpoint. Returns the number of
    /// snapshots written.
    pub async fn process_checkpoint(&self) -> Result<usize, ProcessingError> {
        let rows = self
            .store
            .baker_checkpoints()
            .await
            .map_err(|e| ProcessingError::bakers("reading checkpoints", e))?;
        if rows.is_empty() {
            return Ok(0);
        }

        let latest = collapse_latest(rows.iter().map(|r| (r.delegate.as_str(), r.block_level)));

        let mut snapshots = Vec::with_capacity(latest.len());
        for (level, ids) in group_by_level(latest) {
            for chunk in ids.chunks(self.batch_size) {
                let states = self.node.get_bakers_at(level, chunk).await.map_err(|e| {
                    ProcessingError::bakers(format!("fetching states at level {level}"), e)
                })?;
                snapshots.extend(
                    states
                        .iter()
                        .map(|(id, data)| mappers::baker_snapshot(id, level, data)),
                );
            }
        }

        self.store
            .write_baker_snapshots(&snapshots)
            .await
            .map_err(|e| ProcessingError::bakers("writing snapshots", e))?;

        self.store
            .delete_baker_checkpoints(&rows)
            .await
            .map_err(|e| ProcessingError::bakers("deleting consumed checkpoints", e))?;

        info!(count = snapshots.len(), "baker snapshots written");
        Ok(snapshots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNode;
    use chainlens_core::types::AccountCheckpoint;
    use chainlens_storage::{CheckpointStore as _, MemoryStore};

    fn checkpoint(id: &str, level: u64) -> AccountCheckpoint {
        AccountCheckpoint {
            account_id: id.into(),
            block_level: level,
            block_hash: format!("BL{level:08}"),
            cycle: None,
        }
    }

    #[tokio::test]
    async fn collapses_to_latest_level_per_account() {
        let store = Arc::new(MemoryStore::new());
        store
            .write_account_checkpoints(&[
                checkpoint("tz1Alice", 10),
                checkpoint("tz1Alice", 15),
                checkpoint("tz1Bob", 12),
            ])
            .await
            .unwrap();

        let node = Arc::new(MockNode::with_chain(20));
        let processor = AccountsProcessor::new(store.clone(), node.clone(), 100);
        let written = processor.process_checkpoint().await.unwrap();

        assert_eq!(written, 2);
        // Alice snapshotted at her latest checkpoint only.
        assert_eq!(store.snapshot_levels("tz1Alice"), vec![15]);
        assert_eq!(store.snapshot_levels("tz1Bob"), vec![12]);
        // All consumed rows are gone.
        assert_eq!(store.account_checkpoint_count(), 0);

        // The node was asked once per level.
        let fetches = node.account_fetches.lock().unwrap();
        let levels: Vec<u64> = fetches.iter().map(|(level, _)| *level).collect();
        assert_eq!(levels, vec![12, 15]);
    }

    #[tokio::test]
    async fn batches_respect_accounts_size() {
        let store = Arc::new(MemoryStore::new());
        let rows: Vec<AccountCheckpoint> = (0..5)
            .map(|i| checkpoint(&format!("tz1acc{i}"), 10))
            .collect();
        store.write_account_checkpoints(&rows).await.unwrap();

        let node = Arc::new(MockNode::with_chain(20));
        let processor = AccountsProcessor::new(store.clone(), node.clone(), 2);
        processor.process_checkpoint().await.unwrap();

        let fetches = node.account_fetches.lock().unwrap();
        assert_eq!(fetches.len(), 3); // 2 + 2 + 1
        assert!(fetches.iter().all(|(_, ids)| ids.len() <= 2));
    }

    #[tokio::test]
    async fn node_failure_keeps_checkpoints() {
        let store = Arc::new(MemoryStore::new());
        store
            .write_account_checkpoints(&[checkpoint("tz1Alice", 10)])
            .await
            .unwrap();

        let mut node = MockNode::with_chain(20);
        node.fail_state_fetches = true;
        let processor = AccountsProcessor::new(store.clone(), Arc::new(node), 100);

        let err = processor.process_checkpoint().await.unwrap_err();
        assert!(matches!(err, ProcessingError::Accounts { .. }));
        assert_eq!(store.account_checkpoint_count(), 1);
        assert!(store.snapshot_levels("tz1Alice").is_empty());
    }

    #[tokio::test]
    async fn concurrent_checkpoint_rows_survive_consumption() {
        let store = Arc::new(MemoryStore::new());
        store
            .write_account_checkpoints(&[checkpoint("tz1Alice", 10)])
            .await
            .unwrap();

        let node = Arc::new(MockNode::with_chain(20));
        let processor = AccountsProcessor::new(store.clone(), node, 100);

        // A row inserted after the processor's read (simulated by inserting
        // one the processor never saw before deletion).
        let rows = store.account_checkpoints().await.unwrap();
        processor.process_checkpoint().await.unwrap();
        store
            .write_account_checkpoints(&[checkpoint("tz1Alice", 18)])
            .await
            .unwrap();
        store.delete_account_checkpoints(&rows).await.unwrap();

        assert_eq!(store.account_checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn empty_checkpoint_table_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let node = Arc::new(MockNode::with_chain(20));
        let processor = AccountsProcessor::new(store, node.clone(), 100);
        assert_eq!(processor.process_checkpoint().await.unwrap(), 0);
        assert!(node.account_fetches.lock().unwrap().is_empty());
    }
}
