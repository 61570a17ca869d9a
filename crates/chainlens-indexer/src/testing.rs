//! Shared fixtures and a scriptable mock node for the crate's tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chainlens_rpc::node::{
    AccountData, BakerData, BakingRightData, BlockData, BlockHeader, BlockMetadata, BlockRef,
    EndorsingRightData, LevelInfo, LevelRange, NodeRpc, OperationContent, OperationGroup,
    TransactionParameters,
};
use chainlens_rpc::NodeError;

pub const TEST_BLOCKS_PER_CYCLE: u64 = 16;

pub fn block_hash(level: u64) -> String {
    format!("BL{level:08}")
}

pub fn block_with_ops(level: u64, contents: Vec<OperationContent>) -> BlockData {
    BlockData {
        protocol: "PtTestProto".into(),
        chain_id: Some("NetXtest".into()),
        hash: block_hash(level),
        header: BlockHeader {
            level,
            predecessor: block_hash(level.saturating_sub(1)),
            timestamp: Utc
                .timestamp_opt(1_700_000_000 + level as i64 * 8, 0)
                .unwrap(),
        },
        metadata: Some(BlockMetadata {
            baker: Some("tz1Baker".into()),
            level_info: Some(LevelInfo {
                cycle: level / TEST_BLOCKS_PER_CYCLE,
            }),
        }),
        operations: vec![vec![OperationGroup {
            hash: format!("op{level}"),
            contents,
        }]],
    }
}

pub fn block_data(level: u64) -> BlockData {
    block_with_ops(level, vec![])
}

pub fn transaction(source: &str, destination: &str, amount: u64, fee: u64) -> OperationContent {
    OperationContent {
        kind: "transaction".into(),
        source: Some(source.into()),
        destination: Some(destination.into()),
        delegate: None,
        fee: Some(fee.to_string()),
        amount: Some(amount.to_string()),
        counter: Some("1".into()),
        parameters: None,
    }
}

pub fn endorsement(delegate: &str) -> OperationContent {
    OperationContent {
        kind: "endorsement".into(),
        source: None,
        destination: None,
        delegate: Some(delegate.into()),
        fee: None,
        amount: None,
        counter: None,
        parameters: None,
    }
}

pub fn contract_call(
    source: &str,
    contract: &str,
    entrypoint: &str,
    value: serde_json::Value,
) -> OperationContent {
    OperationContent {
        kind: "transaction".into(),
        source: Some(source.into()),
        destination: Some(contract.into()),
        delegate: None,
        fee: Some("1000".into()),
        amount: Some("0".into()),
        counter: Some("1".into()),
        parameters: Some(TransactionParameters {
            entrypoint: entrypoint.into(),
            value,
        }),
    }
}

/// Scriptable in-memory node.
pub struct MockNode {
    pub blocks: BTreeMap<u64, BlockData>,
    pub head_level: u64,
    /// Any page containing this level fails with a network error.
    pub fail_at_level: Option<u64>,
    /// Fail every account/baker state fetch.
    pub fail_state_fetches: bool,
    pub accounts: HashMap<String, AccountData>,
    pub bakers: HashMap<String, BakerData>,
    pub baking_rights: HashMap<u64, Vec<BakingRightData>>,
    pub endorsing_rights: HashMap<u64, Vec<EndorsingRightData>>,
    pub page_size: u64,
    /// Recorded `get_accounts_at` calls: (level, ids).
    pub account_fetches: Mutex<Vec<(u64, Vec<String>)>>,
}

impl MockNode {
    /// A chain of empty blocks `[0, head]`.
    pub fn with_chain(head: u64) -> Self {
        let blocks = (0..=head).map(|l| (l, block_data(l))).collect();
        Self {
            blocks,
            head_level: head,
            fail_at_level: None,
            fail_state_fetches: false,
            accounts: HashMap::new(),
            bakers: HashMap::new(),
            baking_rights: HashMap::new(),
            endorsing_rights: HashMap::new(),
            page_size: 50,
            account_fetches: Mutex::new(vec![]),
        }
    }

    pub fn insert_block(&mut self, block: BlockData) {
        let level = block.level();
        self.head_level = self.head_level.max(level);
        self.blocks.insert(level, block);
    }

    fn default_account() -> AccountData {
        AccountData {
            balance: "5000000".into(),
            delegate: None,
            counter: Some("1".into()),
        }
    }

    fn default_baker() -> BakerData {
        BakerData {
            staking_balance: "8000000000".into(),
            delegated_balance: Some("2000000000".into()),
            deactivated: false,
        }
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn get_block(&self, block: &BlockRef) -> Result<BlockData, NodeError> {
        match block {
            BlockRef::Head => self
                .blocks
                .get(&self.head_level)
                .cloned()
                .ok_or_else(|| NodeError::Network("no head".into())),
            BlockRef::Level(level) => self
                .blocks
                .get(level)
                .cloned()
                .ok_or_else(|| NodeError::Network(format!("no block at level {level}"))),
            BlockRef::Hash(hash) => self
                .blocks
                .values()
                .find(|b| b.hash == *hash)
                .cloned()
                .ok_or_else(|| NodeError::Network(format!("unknown block {hash}"))),
        }
    }

    async fn get_block_head(&self) -> Result<BlockData, NodeError> {
        self.get_block(&BlockRef::Head).await
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }

    async fn fetch_page(&self, page: &LevelRange) -> Result<Vec<BlockData>, NodeError> {
        if let Some(bad) = self.fail_at_level {
            if page.start <= bad && bad <= page.end {
                return Err(NodeError::Network(format!(
                    "simulated failure at level {bad}"
                )));
            }
        }
        page.levels()
            .map(|l| {
                self.blocks
                    .get(&l)
                    .cloned()
                    .ok_or_else(|| NodeError::Network(format!("no block at level {l}")))
            })
            .collect()
    }

    async fn get_accounts_at(
        &self,
        level: u64,
        ids: &[String],
    ) -> Result<Vec<(String, AccountData)>, NodeError> {
        if self.fail_state_fetches {
            return Err(NodeError::Network("simulated account fetch failure".into()));
        }
        self.account_fetches
            .lock()
            .unwrap()
            .push((level, ids.to_vec()));
        Ok(ids
            .iter()
            .map(|id| {
                let data = self.accounts.get(id).cloned().unwrap_or_else(Self::default_account);
                (id.clone(), data)
            })
            .collect())
    }

    async fn get_bakers_at(
        &self,
        _level: u64,
        ids: &[String],
    ) -> Result<Vec<(String, BakerData)>, NodeError> {
        if self.fail_state_fetches {
            return Err(NodeError::Network("simulated baker fetch failure".into()));
        }
        Ok(ids
            .iter()
            .map(|id| {
                let data = self.bakers.get(id).cloned().unwrap_or_else(Self::default_baker);
                (id.clone(), data)
            })
            .collect())
    }

    async fn get_baking_rights(&self, cycle: u64) -> Result<Vec<BakingRightData>, NodeError> {
        Ok(self.baking_rights.get(&cycle).cloned().unwrap_or_default())
    }

    async fn get_endorsing_rights(&self, cycle: u64) -> Result<Vec<EndorsingRightData>, NodeError> {
        Ok(self.endorsing_rights.get(&cycle).cloned().unwrap_or_default())
    }
}
