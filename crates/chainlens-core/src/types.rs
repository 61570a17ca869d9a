//! Domain types shared by the ingestion pipeline and the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Blocks & operations ─────────────────────────────────────────────────────

/// A persisted block row. Identity is the `hash`; `level` is strictly
/// increasing within a fork and immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub level: u64,
    pub predecessor: String,
    pub timestamp: DateTime<Utc>,
    pub protocol: String,
    pub baker: Option<String>,
    /// Raw block metadata as delivered by the node.
    pub metadata: serde_json::Value,
}

/// The kind of an on-chain operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transaction,
    Origination,
    Delegation,
    Reveal,
    Endorsement,
    Activation,
    Other,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Origination => "origination",
            Self::Delegation => "delegation",
            Self::Reveal => "reveal",
            Self::Endorsement => "endorsement",
            Self::Activation => "activation",
            Self::Other => "other",
        }
    }

    /// Parse the node's `kind` string; anything unrecognized maps to `Other`.
    pub fn parse(kind: &str) -> Self {
        match kind {
            "transaction" => Self::Transaction,
            "origination" => Self::Origination,
            "delegation" => Self::Delegation,
            "reveal" => Self::Reveal,
            "endorsement" | "endorsement_with_dal" => Self::Endorsement,
            "activate_account" => Self::Activation,
            _ => Self::Other,
        }
    }
}

/// A flattened operation, one row per operation content. Ordered within a
/// block by `op_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    pub block_hash: String,
    pub block_level: u64,
    pub op_index: u32,
    pub group_hash: String,
    pub kind: OperationKind,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub delegate: Option<String>,
    /// Fee in the chain's smallest unit.
    pub fee: Option<u64>,
    pub amount: Option<u64>,
    pub counter: Option<u64>,
}

// ─── Checkpoints & snapshots ─────────────────────────────────────────────────

/// A pending work item: the account must be re-snapshotted at `block_level`.
///
/// Multiple rows per account are allowed; consuming collapses to the latest
/// row per account and deletes exactly the rows that were collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountCheckpoint {
    pub account_id: String,
    pub block_level: u64,
    pub block_hash: String,
    pub cycle: Option<u64>,
}

/// The baker analogue of [`AccountCheckpoint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BakerCheckpoint {
    pub delegate: String,
    pub block_level: u64,
    pub block_hash: String,
    pub cycle: Option<u64>,
}

/// An account state snapshot, keyed by `(account_id, block_level)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub block_level: u64,
    pub balance: u64,
    pub delegate: Option<String>,
    pub counter: Option<u64>,
    pub is_baker: bool,
}

/// A delegate state snapshot, keyed by `(delegate, block_level)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakerSnapshot {
    pub delegate: String,
    pub block_level: u64,
    pub staking_balance: u64,
    pub delegated_balance: u64,
    pub deactivated: bool,
}

// ─── Rights ──────────────────────────────────────────────────────────────────

/// Whether a right entitles the delegate to bake or to endorse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightsKind {
    Baking,
    Endorsing,
}

impl RightsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baking => "baking",
            Self::Endorsing => "endorsing",
        }
    }
}

/// A baking or endorsing right for a delegate at a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RightsRow {
    pub level: u64,
    pub cycle: u64,
    pub delegate: String,
    pub slot: u32,
    pub kind: RightsKind,
    /// Estimated at insertion, replaced with the real block timestamp once
    /// the block is indexed.
    pub estimated_time: Option<DateTime<Utc>>,
}

// ─── Reset events ────────────────────────────────────────────────────────────

/// A protocol-upgrade-driven signal: all accounts must be re-fetched at
/// `activation_level`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResetEvent {
    pub protocol: String,
    pub activation_level: u64,
    pub kind: String,
}

// ─── Token rows ──────────────────────────────────────────────────────────────

/// A token movement derived from a registered token-contract call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub block_level: u64,
    pub op_index: u32,
    pub contract: String,
    pub from: String,
    pub to: String,
    pub amount: u64,
}

/// A token balance observation (from a `balanceOf`-style probe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub block_level: u64,
    pub contract: String,
    pub holder: String,
    pub balance: u64,
}

/// A name-service registration mapping a name to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TnsEntry {
    pub name: String,
    pub address: String,
    pub registered_at_level: u64,
}

// ─── Fees ────────────────────────────────────────────────────────────────────

/// Sliding-window fee statistics for one operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStats {
    pub kind: OperationKind,
    pub low: u64,
    pub mean: u64,
    pub high: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_parse_roundtrip() {
        assert_eq!(OperationKind::parse("transaction"), OperationKind::Transaction);
        assert_eq!(OperationKind::parse("endorsement"), OperationKind::Endorsement);
        assert_eq!(OperationKind::parse("endorsement_with_dal"), OperationKind::Endorsement);
        assert_eq!(OperationKind::parse("double_baking_evidence"), OperationKind::Other);
    }

    #[test]
    fn rights_kind_str() {
        assert_eq!(RightsKind::Baking.as_str(), "baking");
        assert_eq!(RightsKind::Endorsing.as_str(), "endorsing");
    }
}
