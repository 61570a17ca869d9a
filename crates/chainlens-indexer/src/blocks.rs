//! The blocks processor.
//!
//! Turns a fetched page into row writes — block, operations, checkpoint
//! fanout, token rows, TNS rows — and commits the page as one transaction.
//! A page either lands whole or not at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use chainlens_rpc::node::BlockData;
use chainlens_storage::{BlockStore as _, BlockWrite, Store};

use crate::error::ProcessingError;
use crate::mappers;
use crate::tns::extract_tns;
use crate::tokens::TokenRegistry;

pub struct BlocksProcessor {
    store: Arc<dyn Store>,
    tokens: TokenRegistry,
    tns_contract: Option<String>,
    tns_absence_logged: AtomicBool,
}

impl BlocksProcessor {
    pub fn new(store: Arc<dyn Store>, tokens: TokenRegistry, tns_contract: Option<String>) -> Self {
        Self {
            store,
            tokens,
            tns_contract,
            tns_absence_logged: AtomicBool::new(false),
        }
    }

    /// Process one page of blocks. Returns the number of newly committed
    /// blocks (replayed blocks count zero).
    pub async fn process_blocks_page(&self, page: &[BlockData]) -> Result<usize, ProcessingError> {
        if page.is_empty() {
            return Ok(0);
        }

        let mut blocks: Vec<&BlockData> = page.iter().collect();
        blocks.sort_by_key(|b| b.level());

        if self.tns_contract.is_none() && !self.tns_absence_logged.swap(true, Ordering::Relaxed) {
            info!("no TNS contract configured, name-service extraction disabled");
        }

        let writes: Vec<BlockWrite> = blocks.iter().map(|b| self.block_write(b)).collect();
        let first = blocks.first().map(|b| b.level()).unwrap_or_default();
        let last = blocks.last().map(|b| b.level()).unwrap_or_default();

        let committed = self
            .store
            .write_block_page(&writes)
            .await
            .map_err(|e| ProcessingError::blocks(format!("page [{first}, {last}]"), e))?;

        info!(from = first, to = last, committed, "blocks page committed");
        Ok(committed)
    }

    fn block_write(&self, data: &BlockData) -> BlockWrite {
        let (token_transfers, token_balances) = self.tokens.extract(data);
        let tns_entries = self
            .tns_contract
            .as_deref()
            .map(|contract| extract_tns(contract, data))
            .unwrap_or_default();

        BlockWrite {
            block: mappers::block_row(data),
            operations: mappers::operation_rows(data),
            account_checkpoints: mappers::account_checkpoints(data),
            baker_checkpoints: mappers::baker_checkpoints(data),
            token_transfers,
            token_balances,
            tns_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_with_ops, contract_call, transaction};
    use chainlens_core::config::TokenContractConfig;
    use chainlens_storage::MemoryStore;
    use serde_json::json;

    fn processor(store: Arc<MemoryStore>, tns: Option<&str>) -> BlocksProcessor {
        let tokens = TokenRegistry::from_config(&[TokenContractConfig {
            address: "KT1Token".into(),
            standard: "fa1.2".into(),
            name: None,
        }]);
        BlocksProcessor::new(store, tokens, tns.map(str::to_string))
    }

    #[tokio::test]
    async fn page_commits_blocks_operations_and_checkpoints() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(store.clone(), None);

        let page = vec![
            block_with_ops(1, vec![transaction("tz1Alice", "tz1Bob", 100, 10)]),
            block_with_ops(2, vec![transaction("tz1Carol", "tz1Dave", 200, 20)]),
        ];
        let committed = processor.process_blocks_page(&page).await.unwrap();

        assert_eq!(committed, 2);
        assert_eq!(store.persisted_levels(), vec![1, 2]);
        assert_eq!(store.operation_count(), 2);
        // The four transaction parties, one checkpoint each.
        assert_eq!(store.account_checkpoint_count(), 4);
    }

    #[tokio::test]
    async fn token_and_tns_rows_commit_with_the_page() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(store.clone(), Some("KT1Tns"));

        let page = vec![block_with_ops(
            5,
            vec![
                contract_call(
                    "tz1Alice",
                    "KT1Token",
                    "transfer",
                    json!({"from": "tz1Alice", "to": "tz1Bob", "value": "42"}),
                ),
                contract_call(
                    "tz1Alice",
                    "KT1Tns",
                    "registerName",
                    json!({"name": "alice.tez", "owner": "tz1Alice"}),
                ),
            ],
        )];
        processor.process_blocks_page(&page).await.unwrap();

        assert_eq!(store.token_transfer_count(), 1);
        let entry = store.tns_entry("alice.tez").unwrap();
        assert_eq!(entry.address, "tz1Alice");
        assert_eq!(entry.registered_at_level, 5);
    }

    #[tokio::test]
    async fn replaying_a_page_commits_nothing_new() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(store.clone(), None);

        let page = vec![block_with_ops(
            9,
            vec![transaction("tz1Alice", "tz1Bob", 1, 1)],
        )];
        assert_eq!(processor.process_blocks_page(&page).await.unwrap(), 1);
        assert_eq!(processor.process_blocks_page(&page).await.unwrap(), 0);
        assert_eq!(store.operation_count(), 1);
    }

    #[tokio::test]
    async fn conflicting_page_surfaces_blocks_failure() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(store.clone(), None);

        processor
            .process_blocks_page(&[block_with_ops(3, vec![])])
            .await
            .unwrap();

        let mut forked = block_with_ops(3, vec![]);
        forked.hash = "BLfork".into();
        let err = processor
            .process_blocks_page(&[forked])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Blocks { .. }));
    }
}
