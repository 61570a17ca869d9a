//! Protocol-upgrade account resets.
//!
//! A reset event declares that every known account must be re-snapshotted
//! at its activation level. Application is idempotent bookkeeping: due
//! events fan out synthetic checkpoints, get marked applied, and drop out
//! of the carry-over set; everything else is returned unchanged and retried
//! next cycle.

use std::sync::Arc;
use tracing::info;

use chainlens_core::types::{AccountCheckpoint, ResetEvent};
use chainlens_storage::{AccountStore as _, BlockStore as _, CheckpointStore as _, ResetStore as _, Store};

use crate::error::ProcessingError;

pub struct AccountsResetHandler {
    store: Arc<dyn Store>,
}

impl AccountsResetHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Events whose activation level has been reached by the indexed chain
    /// but which have not been applied yet.
    pub async fn unprocessed_reset_levels(
        &self,
        events: &[ResetEvent],
    ) -> Result<Vec<ResetEvent>, ProcessingError> {
        let Some(l_db) = self
            .store
            .max_level()
            .await
            .map_err(|e| ProcessingError::accounts("reading max level", e))?
        else {
            return Ok(vec![]);
        };
        let applied = self
            .store
            .applied_reset_levels()
            .await
            .map_err(|e| ProcessingError::accounts("reading applied resets", e))?;

        Ok(events
            .iter()
            .filter(|e| e.activation_level <= l_db && !applied.contains(&e.activation_level))
            .cloned()
            .collect())
    }

    /// Apply every due event from `events`, returning the events that remain
    /// unhandled (not yet due, or not applied this cycle). The caller
    /// retries the returned set until it drains.
    pub async fn apply_unhandled_resets(
        &self,
        events: &[ResetEvent],
    ) -> Result<Vec<ResetEvent>, ProcessingError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let due = self.unprocessed_reset_levels(events).await?;

        for event in &due {
            let accounts = self
                .store
                .account_ids()
                .await
                .map_err(|e| ProcessingError::accounts("listing accounts for reset", e))?;
            let block_hash = self
                .store
                .block_at_level(event.activation_level)
                .await
                .map_err(|e| ProcessingError::accounts("resolving activation block", e))?
                .map(|b| b.hash)
                .unwrap_or_default();

            let checkpoints: Vec<AccountCheckpoint> = accounts
                .into_iter()
                .map(|account_id| AccountCheckpoint {
                    account_id,
                    block_level: event.activation_level,
                    block_hash: block_hash.clone(),
                    cycle: None,
                })
                .collect();

            self.store
                .write_account_checkpoints(&checkpoints)
                .await
                .map_err(|e| ProcessingError::accounts("enqueueing reset checkpoints", e))?;
            self.store
                .mark_reset_applied(event)
                .await
                .map_err(|e| ProcessingError::accounts("marking reset applied", e))?;

            info!(
                protocol = %event.protocol,
                level = event.activation_level,
                refreshed = checkpoints.len(),
                "account reset applied"
            );
        }

        // Whatever is recorded as applied — now or in an earlier run —
        // drops out of the carry-over set.
        let applied = self
            .store
            .applied_reset_levels()
            .await
            .map_err(|e| ProcessingError::accounts("re-reading applied resets", e))?;
        Ok(events
            .iter()
            .filter(|e| !applied.contains(&e.activation_level))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::block_data;
    use crate::mappers;
    use chainlens_core::types::AccountSnapshot;
    use chainlens_storage::{
        AccountStore as _, BlockStore as _, BlockWrite, CheckpointStore as _, MemoryStore,
        ResetStore as _,
    };

    fn event(level: u64) -> ResetEvent {
        ResetEvent {
            protocol: format!("Pproto{level}"),
            activation_level: level,
            kind: "accounts".into(),
        }
    }

    fn snapshot(id: &str) -> AccountSnapshot {
        AccountSnapshot {
            account_id: id.into(),
            block_level: 1,
            balance: 100,
            delegate: None,
            counter: None,
            is_baker: false,
        }
    }

    async fn seeded_store(chain_to: u64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let writes: Vec<BlockWrite> = (0..=chain_to)
            .map(|l| BlockWrite::for_block(mappers::block_row(&block_data(l))))
            .collect();
        store.write_block_page(&writes).await.unwrap();
        store
            .write_account_snapshots(&[snapshot("tz1Alice"), snapshot("tz1Bob")])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn due_event_enqueues_checkpoints_for_every_account() {
        let store = seeded_store(50).await;
        let handler = AccountsResetHandler::new(store.clone());

        let unhandled = handler
            .apply_unhandled_resets(&[event(40), event(90)])
            .await
            .unwrap();

        // Level 40 is due (chain at 50); level 90 is carried over.
        assert_eq!(unhandled, vec![event(90)]);
        assert_eq!(store.account_checkpoint_count(), 2);
        let rows = store.account_checkpoints().await.unwrap();
        assert!(rows.iter().all(|r| r.block_level == 40));
        assert_eq!(store.applied_reset_levels().await.unwrap(), vec![40]);
    }

    #[tokio::test]
    async fn applied_event_is_not_reapplied() {
        let store = seeded_store(50).await;
        let handler = AccountsResetHandler::new(store.clone());

        handler.apply_unhandled_resets(&[event(40)]).await.unwrap();
        let rows = store.account_checkpoints().await.unwrap();
        store.delete_account_checkpoints(&rows).await.unwrap();

        // Retrying with the same set finds nothing due.
        let unhandled = handler.apply_unhandled_resets(&[event(40)]).await.unwrap();
        assert!(unhandled.is_empty());
        assert_eq!(store.account_checkpoint_count(), 0);
    }

    #[tokio::test]
    async fn empty_store_carries_all_events() {
        let store = Arc::new(MemoryStore::new());
        let handler = AccountsResetHandler::new(store.clone());
        let unhandled = handler.apply_unhandled_resets(&[event(10)]).await.unwrap();
        assert_eq!(unhandled, vec![event(10)]);
    }
}
