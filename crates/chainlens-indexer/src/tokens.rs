//! Token-contract call extraction.
//!
//! A registry of known token contracts is matched against every contract
//! call in a block. Transfers produce [`TokenTransfer`] rows; balance
//! probes whose callback value carries the balance produce [`TokenBalance`]
//! rows. Parameters are expected in the node's normalized JSON encoding.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use chainlens_core::config::TokenContractConfig;
use chainlens_core::types::{OperationKind, TokenBalance, TokenTransfer};
use chainlens_rpc::node::BlockData;

/// Supported token standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStandard {
    Fa12,
    Fa2,
}

/// Registered token contracts, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    contracts: HashMap<String, TokenStandard>,
}

impl TokenRegistry {
    pub fn from_config(configs: &[TokenContractConfig]) -> Self {
        let mut contracts = HashMap::new();
        for cfg in configs {
            let standard = match cfg.standard.as_str() {
                "fa1.2" | "fa12" => TokenStandard::Fa12,
                "fa2" => TokenStandard::Fa2,
                other => {
                    warn!(address = %cfg.address, standard = other, "unknown token standard, skipping");
                    continue;
                }
            };
            contracts.insert(cfg.address.clone(), standard);
        }
        Self { contracts }
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Extract token rows from one block.
    pub fn extract(&self, block: &BlockData) -> (Vec<TokenTransfer>, Vec<TokenBalance>) {
        let mut transfers = Vec::new();
        let mut balances = Vec::new();
        if self.contracts.is_empty() {
            return (transfers, balances);
        }

        for (op_index, (_, content)) in block.contents().enumerate() {
            if OperationKind::parse(&content.kind) != OperationKind::Transaction {
                continue;
            }
            let Some(contract) = content.destination.as_deref() else {
                continue;
            };
            let Some(standard) = self.contracts.get(contract) else {
                continue;
            };
            let Some(params) = &content.parameters else {
                continue;
            };

            let op_index = op_index as u32;
            match (standard, params.entrypoint.as_str()) {
                (TokenStandard::Fa12, "transfer") => {
                    if let Some(t) = fa12_transfer(block, op_index, contract, &params.value) {
                        transfers.push(t);
                    }
                }
                (TokenStandard::Fa2, "transfer") => {
                    transfers.extend(fa2_transfers(block, op_index, contract, &params.value));
                }
                (TokenStandard::Fa12, "getBalance") | (TokenStandard::Fa2, "balance_of") => {
                    if let Some(b) = balance_probe(block, contract, &params.value) {
                        balances.push(b);
                    }
                }
                _ => {}
            }
        }
        (transfers, balances)
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

fn amount_field(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// FA1.2 transfer parameter: `{"from": a, "to": b, "value": n}`.
fn fa12_transfer(
    block: &BlockData,
    op_index: u32,
    contract: &str,
    value: &Value,
) -> Option<TokenTransfer> {
    Some(TokenTransfer {
        block_level: block.level(),
        op_index,
        contract: contract.to_string(),
        from: str_field(value, "from")?,
        to: str_field(value, "to")?,
        amount: amount_field(value, "value")?,
    })
}

/// FA2 transfer parameter: `[{"from_": a, "txs": [{"to_": b, "amount": n}]}]`.
fn fa2_transfers(
    block: &BlockData,
    op_index: u32,
    contract: &str,
    value: &Value,
) -> Vec<TokenTransfer> {
    let Some(batches) = value.as_array() else {
        return vec![];
    };
    let mut out = Vec::new();
    for batch in batches {
        let Some(from) = str_field(batch, "from_") else {
            continue;
        };
        let Some(txs) = batch.get("txs").and_then(Value::as_array) else {
            continue;
        };
        for tx in txs {
            let (Some(to), Some(amount)) = (str_field(tx, "to_"), amount_field(tx, "amount"))
            else {
                continue;
            };
            out.push(TokenTransfer {
                block_level: block.level(),
                op_index,
                contract: contract.to_string(),
                from: from.clone(),
                to,
                amount,
            });
        }
    }
    out
}

/// A balance probe whose callback value carries the observed balance:
/// `{"owner": a, "balance": n}`.
fn balance_probe(block: &BlockData, contract: &str, value: &Value) -> Option<TokenBalance> {
    Some(TokenBalance {
        block_level: block.level(),
        contract: contract.to_string(),
        holder: str_field(value, "owner")?,
        balance: amount_field(value, "balance")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_with_ops, contract_call, transaction};
    use serde_json::json;

    fn registry() -> TokenRegistry {
        TokenRegistry::from_config(&[
            TokenContractConfig {
                address: "KT1Fa12".into(),
                standard: "fa1.2".into(),
                name: Some("testtoken".into()),
            },
            TokenContractConfig {
                address: "KT1Fa2".into(),
                standard: "fa2".into(),
                name: None,
            },
        ])
    }

    #[test]
    fn fa12_transfer_is_extracted() {
        let block = block_with_ops(
            100,
            vec![contract_call(
                "tz1Alice",
                "KT1Fa12",
                "transfer",
                json!({"from": "tz1Alice", "to": "tz1Bob", "value": "250"}),
            )],
        );
        let (transfers, balances) = registry().extract(&block);
        assert_eq!(transfers.len(), 1);
        assert!(balances.is_empty());
        assert_eq!(transfers[0].from, "tz1Alice");
        assert_eq!(transfers[0].to, "tz1Bob");
        assert_eq!(transfers[0].amount, 250);
        assert_eq!(transfers[0].contract, "KT1Fa12");
    }

    #[test]
    fn fa2_batch_transfer_expands_per_tx() {
        let block = block_with_ops(
            101,
            vec![contract_call(
                "tz1Alice",
                "KT1Fa2",
                "transfer",
                json!([{
                    "from_": "tz1Alice",
                    "txs": [
                        {"to_": "tz1Bob", "token_id": 0, "amount": 10},
                        {"to_": "tz1Carol", "token_id": 0, "amount": 20}
                    ]
                }]),
            )],
        );
        let (transfers, _) = registry().extract(&block);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[1].to, "tz1Carol");
        assert_eq!(transfers[1].amount, 20);
    }

    #[test]
    fn balance_probe_with_callback_value() {
        let block = block_with_ops(
            102,
            vec![contract_call(
                "tz1Alice",
                "KT1Fa12",
                "getBalance",
                json!({"owner": "tz1Bob", "balance": "9000"}),
            )],
        );
        let (_, balances) = registry().extract(&block);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].holder, "tz1Bob");
        assert_eq!(balances[0].balance, 9000);
    }

    #[test]
    fn unregistered_contract_is_ignored() {
        let block = block_with_ops(
            103,
            vec![
                contract_call(
                    "tz1Alice",
                    "KT1Unknown",
                    "transfer",
                    json!({"from": "tz1Alice", "to": "tz1Bob", "value": "1"}),
                ),
                transaction("tz1Alice", "tz1Bob", 5, 1),
            ],
        );
        let (transfers, balances) = registry().extract(&block);
        assert!(transfers.is_empty());
        assert!(balances.is_empty());
    }

    #[test]
    fn unknown_standard_is_skipped_at_registry_build() {
        let registry = TokenRegistry::from_config(&[TokenContractConfig {
            address: "KT1Odd".into(),
            standard: "erc20".into(),
            name: None,
        }]);
        assert!(registry.is_empty());
    }
}
