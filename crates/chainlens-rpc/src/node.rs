//! Node data shapes and the `NodeRpc` seam.
//!
//! The wire structs mirror the chain node's JSON: nested header/metadata,
//! operations as a list of validation-pass groups, amounts as decimal
//! strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

// ─── Wire shapes ─────────────────────────────────────────────────────────────

/// A block as delivered by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockData {
    pub protocol: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    pub hash: String,
    pub header: BlockHeader,
    #[serde(default)]
    pub metadata: Option<BlockMetadata>,
    #[serde(default)]
    pub operations: Vec<Vec<OperationGroup>>,
}

impl BlockData {
    pub fn level(&self) -> u64 {
        self.header.level
    }

    pub fn baker(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.baker.as_deref())
    }

    pub fn cycle(&self) -> Option<u64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.level_info.as_ref())
            .map(|l| l.cycle)
    }

    /// All operation contents across validation passes, flattened in wire
    /// order.
    pub fn contents(&self) -> impl Iterator<Item = (&OperationGroup, &OperationContent)> + '_ {
        self.operations
            .iter()
            .flatten()
            .flat_map(|g| g.contents.iter().map(move |c| (g, c)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub level: u64,
    pub predecessor: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMetadata {
    #[serde(default)]
    pub baker: Option<String>,
    #[serde(default)]
    pub level_info: Option<LevelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelInfo {
    pub cycle: u64,
}

/// One signed operation group (a single hash, one or more contents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationGroup {
    pub hash: String,
    #[serde(default)]
    pub contents: Vec<OperationContent>,
}

/// One operation content. Fields are optional because their presence depends
/// on `kind`; amounts are decimal strings on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContent {
    pub kind: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub delegate: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub counter: Option<String>,
    #[serde(default)]
    pub parameters: Option<TransactionParameters>,
}

/// Parameters of a contract call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionParameters {
    pub entrypoint: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Account state as delivered by the node's context query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountData {
    pub balance: String,
    #[serde(default)]
    pub delegate: Option<String>,
    #[serde(default)]
    pub counter: Option<String>,
}

/// Baker (delegate) state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakerData {
    pub staking_balance: String,
    #[serde(default)]
    pub delegated_balance: Option<String>,
    #[serde(default)]
    pub deactivated: bool,
}

/// One baking right as delivered by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakingRightData {
    pub level: u64,
    pub delegate: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub estimated_time: Option<DateTime<Utc>>,
}

/// One endorsing right as delivered by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorsingRightData {
    pub level: u64,
    pub delegate: String,
    #[serde(default)]
    pub slots: Vec<u32>,
    #[serde(default)]
    pub estimated_time: Option<DateTime<Utc>>,
}

/// Parse a decimal-string amount (mutez-style) to u64.
pub fn parse_amount(s: Option<&str>) -> Option<u64> {
    s.and_then(|v| v.parse::<u64>().ok())
}

// ─── Block references & page ranges ──────────────────────────────────────────

/// How to address a block on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Head,
    Level(u64),
    Hash(String),
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Head => write!(f, "head"),
            Self::Level(l) => write!(f, "{l}"),
            Self::Hash(h) => write!(f, "{h}"),
        }
    }
}

/// An inclusive range of block levels, at most one fetch page wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    pub start: u64,
    pub end: u64,
}

impl LevelRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn levels(&self) -> impl Iterator<Item = u64> {
        self.start..=self.end
    }
}

/// Split `[from, to]` into ascending, non-overlapping pages of at most
/// `page_size` levels. Empty when `to < from`.
pub fn pages(from: u64, to: u64, page_size: u64) -> Vec<LevelRange> {
    assert!(page_size > 0, "page_size must be positive");
    if to < from {
        return vec![];
    }
    let mut out = Vec::new();
    let mut start = from;
    while start <= to {
        let end = (start + page_size - 1).min(to);
        out.push(LevelRange { start, end });
        start = end + 1;
    }
    out
}

// ─── The client seam ─────────────────────────────────────────────────────────

/// Trait for fetching chain data from a node.
///
/// The production implementation is [`crate::TezosNodeClient`]; tests use
/// in-memory mocks.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Fetch a single block.
    async fn get_block(&self, block: &BlockRef) -> Result<BlockData, NodeError>;

    /// Fetch the current head block.
    async fn get_block_head(&self) -> Result<BlockData, NodeError>;

    /// The configured page width for range fetches.
    fn page_size(&self) -> u64;

    /// Split `[from, to]` into fetch pages. Pages arrive in ascending level
    /// order with no gap within a page; cross-page ordering is the caller's
    /// concern.
    fn get_blocks_range(&self, from: u64, to: u64) -> Vec<LevelRange> {
        pages(from, to, self.page_size())
    }

    /// Fetch every block in a page, returned sorted ascending by level.
    async fn fetch_page(&self, page: &LevelRange) -> Result<Vec<BlockData>, NodeError>;

    /// Fetch account states at a level. The result preserves the pairing of
    /// id to state; ids the node does not know are reported as decode
    /// failures by the implementation.
    async fn get_accounts_at(
        &self,
        level: u64,
        ids: &[String],
    ) -> Result<Vec<(String, AccountData)>, NodeError>;

    /// Fetch baker states at a level.
    async fn get_bakers_at(
        &self,
        level: u64,
        ids: &[String],
    ) -> Result<Vec<(String, BakerData)>, NodeError>;

    /// Fetch the baking rights for a cycle.
    async fn get_baking_rights(&self, cycle: u64) -> Result<Vec<BakingRightData>, NodeError>;

    /// Fetch the endorsing rights for a cycle.
    async fn get_endorsing_rights(&self, cycle: u64) -> Result<Vec<EndorsingRightData>, NodeError>;

    /// Cheap connectivity probe used by the bootup gate.
    async fn check_connection(&self) -> bool {
        self.get_block_head().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_cover_range_without_overlap() {
        let ps = pages(101, 350, 100);
        assert_eq!(
            ps,
            vec![
                LevelRange { start: 101, end: 200 },
                LevelRange { start: 201, end: 300 },
                LevelRange { start: 301, end: 350 },
            ]
        );
        assert_eq!(ps.iter().map(LevelRange::len).sum::<u64>(), 250);
    }

    #[test]
    fn pages_empty_when_inverted() {
        assert!(pages(10, 9, 100).is_empty());
    }

    #[test]
    fn pages_single_level() {
        assert_eq!(pages(5, 5, 100), vec![LevelRange { start: 5, end: 5 }]);
    }

    #[test]
    fn block_data_decodes_node_json() {
        let raw = serde_json::json!({
            "protocol": "PtParisBxoLz5gzMmn3d9WBQNoPSZakgnkMC2VNuQ3KXfUtUQeZ",
            "chain_id": "NetXdQprcVkpaWU",
            "hash": "BLockHash11111111111111111111111111111111111111111",
            "header": {
                "level": 4242,
                "predecessor": "BLockHash00000000000000000000000000000000000000000",
                "timestamp": "2024-06-01T12:00:00Z"
            },
            "metadata": {
                "baker": "tz1Baker",
                "level_info": { "cycle": 17 }
            },
            "operations": [[{
                "hash": "opGroup1",
                "contents": [{
                    "kind": "transaction",
                    "source": "tz1Src",
                    "destination": "tz1Dst",
                    "fee": "1420",
                    "amount": "5000000",
                    "counter": "77"
                }]
            }]]
        });
        let block: BlockData = serde_json::from_value(raw).unwrap();
        assert_eq!(block.level(), 4242);
        assert_eq!(block.baker(), Some("tz1Baker"));
        assert_eq!(block.cycle(), Some(17));
        let (group, content) = block.contents().next().unwrap();
        assert_eq!(group.hash, "opGroup1");
        assert_eq!(parse_amount(content.fee.as_deref()), Some(1420));
    }
}
