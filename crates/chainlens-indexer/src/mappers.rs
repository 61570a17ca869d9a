//! Explicit node-data → row mappers, one per domain pair.

use std::collections::BTreeSet;

use chainlens_core::types::{
    AccountCheckpoint, AccountSnapshot, BakerCheckpoint, BakerSnapshot, Block, OperationKind,
    OperationRow, RightsKind, RightsRow,
};
use chainlens_rpc::node::{parse_amount, AccountData, BakerData, BlockData};

/// Node block → block row.
pub fn block_row(data: &BlockData) -> Block {
    Block {
        hash: data.hash.clone(),
        level: data.level(),
        predecessor: data.header.predecessor.clone(),
        timestamp: data.header.timestamp,
        protocol: data.protocol.clone(),
        baker: data.baker().map(str::to_string),
        metadata: data
            .metadata
            .as_ref()
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .unwrap_or_default(),
    }
}

/// Node block → flattened operation rows, ordered by wire position.
pub fn operation_rows(data: &BlockData) -> Vec<OperationRow> {
    data.contents()
        .enumerate()
        .map(|(i, (group, content))| OperationRow {
            block_hash: data.hash.clone(),
            block_level: data.level(),
            op_index: i as u32,
            group_hash: group.hash.clone(),
            kind: OperationKind::parse(&content.kind),
            source: content.source.clone(),
            destination: content.destination.clone(),
            delegate: content.delegate.clone(),
            fee: parse_amount(content.fee.as_deref()),
            amount: parse_amount(content.amount.as_deref()),
            counter: parse_amount(content.counter.as_deref()),
        })
        .collect()
}

/// Every account touched by the block — sources, destinations, and
/// delegates — becomes one checkpoint row at the block's level.
pub fn account_checkpoints(data: &BlockData) -> Vec<AccountCheckpoint> {
    let mut touched = BTreeSet::new();
    for (_, content) in data.contents() {
        for account in [&content.source, &content.destination, &content.delegate]
            .into_iter()
            .flatten()
        {
            touched.insert(account.clone());
        }
    }
    touched
        .into_iter()
        .map(|account_id| AccountCheckpoint {
            account_id,
            block_level: data.level(),
            block_hash: data.hash.clone(),
            cycle: data.cycle(),
        })
        .collect()
}

/// The block's baker and every endorsing delegate become baker checkpoints.
pub fn baker_checkpoints(data: &BlockData) -> Vec<BakerCheckpoint> {
    let mut delegates = BTreeSet::new();
    if let Some(baker) = data.baker() {
        delegates.insert(baker.to_string());
    }
    for (_, content) in data.contents() {
        if OperationKind::parse(&content.kind) == OperationKind::Endorsement {
            if let Some(delegate) = &content.delegate {
                delegates.insert(delegate.clone());
            }
        }
    }
    delegates
        .into_iter()
        .map(|delegate| BakerCheckpoint {
            delegate,
            block_level: data.level(),
            block_hash: data.hash.clone(),
            cycle: data.cycle(),
        })
        .collect()
}

/// Rights realized by an indexed block: the baker's baking right plus one
/// endorsing right per endorsement, all carrying the real block timestamp.
pub fn rights_rows_from_block(data: &BlockData) -> Vec<RightsRow> {
    let cycle = data.cycle().unwrap_or(0);
    let mut rows = Vec::new();
    if let Some(baker) = data.baker() {
        rows.push(RightsRow {
            level: data.level(),
            cycle,
            delegate: baker.to_string(),
            slot: 0,
            kind: RightsKind::Baking,
            estimated_time: Some(data.header.timestamp),
        });
    }
    for (_, content) in data.contents() {
        if OperationKind::parse(&content.kind) == OperationKind::Endorsement {
            if let Some(delegate) = &content.delegate {
                rows.push(RightsRow {
                    level: data.level(),
                    cycle,
                    delegate: delegate.clone(),
                    slot: 0,
                    kind: RightsKind::Endorsing,
                    estimated_time: Some(data.header.timestamp),
                });
            }
        }
    }
    rows
}

/// Node account state → snapshot row.
pub fn account_snapshot(account_id: &str, block_level: u64, data: &AccountData) -> AccountSnapshot {
    AccountSnapshot {
        account_id: account_id.to_string(),
        block_level,
        balance: data.balance.parse().unwrap_or(0),
        delegate: data.delegate.clone(),
        counter: parse_amount(data.counter.as_deref()),
        is_baker: data.delegate.as_deref() == Some(account_id),
    }
}

/// Node baker state → snapshot row.
pub fn baker_snapshot(delegate: &str, block_level: u64, data: &BakerData) -> BakerSnapshot {
    BakerSnapshot {
        delegate: delegate.to_string(),
        block_level,
        staking_balance: data.staking_balance.parse().unwrap_or(0),
        delegated_balance: parse_amount(data.delegated_balance.as_deref()).unwrap_or(0),
        deactivated: data.deactivated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_with_ops, transaction, endorsement};

    #[test]
    fn operations_flatten_in_wire_order() {
        let block = block_with_ops(
            10,
            vec![
                transaction("tz1Alice", "tz1Bob", 1_000, 500),
                transaction("tz1Carol", "tz1Dave", 2_000, 700),
            ],
        );
        let rows = operation_rows(&block);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].op_index, 0);
        assert_eq!(rows[1].op_index, 1);
        assert_eq!(rows[0].source.as_deref(), Some("tz1Alice"));
        assert_eq!(rows[1].fee, Some(700));
        assert_eq!(rows[0].kind, OperationKind::Transaction);
    }

    #[test]
    fn checkpoints_cover_sources_destinations_delegates() {
        let block = block_with_ops(
            20,
            vec![
                transaction("tz1Alice", "tz1Bob", 1, 1),
                endorsement("tz1Delegate"),
            ],
        );
        let checkpoints = account_checkpoints(&block);
        let ids: Vec<&str> = checkpoints.iter().map(|c| c.account_id.as_str()).collect();
        assert!(ids.contains(&"tz1Alice"));
        assert!(ids.contains(&"tz1Bob"));
        assert!(ids.contains(&"tz1Delegate"));
        assert!(checkpoints.iter().all(|c| c.block_level == 20));
    }

    #[test]
    fn duplicate_accounts_collapse_to_one_checkpoint() {
        let block = block_with_ops(
            30,
            vec![
                transaction("tz1Alice", "tz1Bob", 1, 1),
                transaction("tz1Alice", "tz1Bob", 2, 2),
            ],
        );
        assert_eq!(account_checkpoints(&block).len(), 2);
    }

    #[test]
    fn baker_checkpoints_include_block_baker_and_endorsers() {
        let block = block_with_ops(40, vec![endorsement("tz1Endorser")]);
        let checkpoints = baker_checkpoints(&block);
        let delegates: Vec<&str> = checkpoints.iter().map(|c| c.delegate.as_str()).collect();
        assert!(delegates.contains(&"tz1Baker"));
        assert!(delegates.contains(&"tz1Endorser"));
    }

    #[test]
    fn block_rights_carry_the_block_timestamp() {
        let block = block_with_ops(50, vec![endorsement("tz1Endorser")]);
        let rows = rights_rows_from_block(&block);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.estimated_time == Some(block.header.timestamp)));
        assert_eq!(rows[0].kind, RightsKind::Baking);
        assert_eq!(rows[1].kind, RightsKind::Endorsing);
    }

    #[test]
    fn self_delegated_account_is_a_baker() {
        let data = AccountData {
            balance: "12345".into(),
            delegate: Some("tz1Self".into()),
            counter: Some("7".into()),
        };
        let snapshot = account_snapshot("tz1Self", 60, &data);
        assert!(snapshot.is_baker);
        assert_eq!(snapshot.balance, 12_345);
        assert_eq!(snapshot.counter, Some(7));

        let other = account_snapshot("tz1Other", 60, &data);
        assert!(!other.is_baker);
    }
}
