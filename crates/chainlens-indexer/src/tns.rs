//! Name-service (TNS) mapping extraction.
//!
//! When a TNS contract is configured, registration calls against it yield
//! name → address rows. The owner falls back to the call's source when the
//! parameter does not carry one.

use serde_json::Value;

use chainlens_core::types::{OperationKind, TnsEntry};
use chainlens_rpc::node::BlockData;

const REGISTER_ENTRYPOINTS: [&str; 2] = ["registerName", "updateRecord"];

/// Extract TNS entries from one block's calls to the configured contract.
pub fn extract_tns(contract: &str, block: &BlockData) -> Vec<TnsEntry> {
    let mut out = Vec::new();
    for (_, content) in block.contents() {
        if OperationKind::parse(&content.kind) != OperationKind::Transaction {
            continue;
        }
        if content.destination.as_deref() != Some(contract) {
            continue;
        }
        let Some(params) = &content.parameters else {
            continue;
        };
        if !REGISTER_ENTRYPOINTS.contains(&params.entrypoint.as_str()) {
            continue;
        }
        let Some(name) = params.value.get("name").and_then(Value::as_str) else {
            continue;
        };
        let owner = params
            .value
            .get("owner")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| content.source.clone());
        if let Some(address) = owner {
            out.push(TnsEntry {
                name: name.to_string(),
                address,
                registered_at_level: block.level(),
            });
        }
    }
    out
}
