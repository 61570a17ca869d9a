//! Indexer configuration.
//!
//! Everything is serde-deserializable so a network's whole setup can live in
//! one TOML file. Field defaults follow the node operator's common case:
//! tail the chain head, small pages, modest retry budget.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which slice of the chain to index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FetchDepth {
    /// Everything above the latest persisted level, up to the node head.
    Newest,
    /// The full chain from genesis to the node head.
    Everything,
    /// The most recent `n` levels below the head.
    Custom { n: u64 },
}

impl Default for FetchDepth {
    fn default() -> Self {
        Self::Newest
    }
}

/// Connection settings for the chain node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Base URL of the node RPC, e.g. `https://mainnet.tezos.example`.
    pub url: String,
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry budget for transient failures (not counting the first try).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Initial backoff before the first retry, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    200
}

/// Batch sizing for node fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of blocks per fetched page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Maximum number of accounts fetched per node round-trip.
    #[serde(default = "default_accounts_size")]
    pub accounts_size: usize,
    /// Upper bound on concurrent node requests during a fanout.
    #[serde(default = "default_node_requests_concurrency")]
    pub node_requests_concurrency: usize,
}

fn default_page_size() -> u64 {
    50
}
fn default_accounts_size() -> usize {
    100
}
fn default_node_requests_concurrency() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            accounts_size: default_accounts_size(),
            node_requests_concurrency: default_node_requests_concurrency(),
        }
    }
}

/// Main-loop timing and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LorreConfig {
    /// Pause between cycles when tailing the head, in milliseconds.
    #[serde(default = "default_sleep_interval_ms")]
    pub sleep_interval_ms: u64,
    /// Pause between failed bootup connection checks, in milliseconds.
    #[serde(default = "default_bootup_retry_interval_ms")]
    pub bootup_retry_interval_ms: u64,
    /// Deadline per bootup connection attempt, in milliseconds.
    #[serde(default = "default_bootup_check_timeout_ms")]
    pub bootup_connection_check_timeout_ms: u64,
    /// Recompute fee statistics every this many loop iterations.
    #[serde(default = "default_fee_update_interval")]
    pub fee_update_interval: u64,
    /// Window size for the fee statistics.
    #[serde(default = "default_fees_averaged")]
    pub fees_averaged: usize,
    /// Delay before the first future-rights fetch, in milliseconds.
    #[serde(default = "default_rights_init_delay_ms")]
    pub rights_init_delay_ms: u64,
    /// Interval between future-rights fetches, in milliseconds.
    #[serde(default = "default_rights_interval_ms")]
    pub rights_interval_ms: u64,
    /// How many cycles ahead of the head to fetch rights for.
    #[serde(default = "default_rights_lookahead_cycles")]
    pub rights_lookahead_cycles: u64,
    /// Chain constant: blocks per cycle.
    #[serde(default = "default_blocks_per_cycle")]
    pub blocks_per_cycle: u64,
    /// Chain constant: seconds between blocks, used for rights time estimates.
    #[serde(default = "default_seconds_per_block")]
    pub seconds_per_block: u64,
}

fn default_sleep_interval_ms() -> u64 {
    5_000
}
fn default_bootup_retry_interval_ms() -> u64 {
    10_000
}
fn default_bootup_check_timeout_ms() -> u64 {
    5_000
}
fn default_fee_update_interval() -> u64 {
    20
}
fn default_fees_averaged() -> usize {
    1_000
}
fn default_rights_init_delay_ms() -> u64 {
    30_000
}
fn default_rights_interval_ms() -> u64 {
    1_800_000
}
fn default_rights_lookahead_cycles() -> u64 {
    5
}
fn default_blocks_per_cycle() -> u64 {
    16_384
}
fn default_seconds_per_block() -> u64 {
    8
}

impl Default for LorreConfig {
    fn default() -> Self {
        Self {
            sleep_interval_ms: default_sleep_interval_ms(),
            bootup_retry_interval_ms: default_bootup_retry_interval_ms(),
            bootup_connection_check_timeout_ms: default_bootup_check_timeout_ms(),
            fee_update_interval: default_fee_update_interval(),
            fees_averaged: default_fees_averaged(),
            rights_init_delay_ms: default_rights_init_delay_ms(),
            rights_interval_ms: default_rights_interval_ms(),
            rights_lookahead_cycles: default_rights_lookahead_cycles(),
            blocks_per_cycle: default_blocks_per_cycle(),
            seconds_per_block: default_seconds_per_block(),
        }
    }
}

/// A registered token contract the block processor watches for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenContractConfig {
    /// Contract address.
    pub address: String,
    /// Token standard: `fa1.2` or `fa2`.
    pub standard: String,
    /// Human-readable token name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Full configuration for indexing one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name, e.g. `mainnet`. Doubles as the CLI selector.
    pub name: String,
    /// Platform the network belongs to, e.g. `tezos`.
    pub platform: String,
    pub node: NodeConfig,
    #[serde(default)]
    pub depth: FetchDepth,
    /// Optional head anchor for `Custom` depth.
    #[serde(default)]
    pub head_hash: Option<String>,
    /// Bootstrap window when no level has been persisted yet (`Newest` mode);
    /// `None` starts from genesis.
    #[serde(default)]
    pub bootstrap_window: Option<u64>,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub lorre: LorreConfig,
    /// Registered token contracts.
    #[serde(default)]
    pub token_contracts: Vec<TokenContractConfig>,
    /// Name-service contract address; absence disables TNS extraction.
    #[serde(default)]
    pub tns_contract: Option<String>,
    /// Reset events declared for protocol upgrades.
    #[serde(default)]
    pub reset_events: Vec<crate::types::ResetEvent>,
    /// Postgres connection string.
    pub database_url: String,
    #[serde(default)]
    pub log: crate::logging::LogConfig,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.url.is_empty() {
            return Err(ConfigError::Invalid("node.url must not be empty".into()));
        }
        if self.batch.page_size == 0 {
            return Err(ConfigError::Invalid("batch.page_size must be positive".into()));
        }
        if self.batch.accounts_size == 0 {
            return Err(ConfigError::Invalid("batch.accounts_size must be positive".into()));
        }
        Ok(())
    }
}

/// Name of the environment toggle for the loop's failure policy.
pub const FAILURE_IGNORE_ENV: &str = "LORRE_FAILURE_IGNORE";

/// Read the failure policy from the environment: `true`/`yes` (and the usual
/// affirmative spellings) enable it, anything else leaves it off.
pub fn ignore_process_failures_from_env() -> bool {
    match std::env::var(FAILURE_IGNORE_ENV) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "on"
        ),
        Err(_) => false,
    }
}
