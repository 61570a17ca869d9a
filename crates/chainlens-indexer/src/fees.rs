//! Sliding-window fee statistics.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use chainlens_core::types::{FeeStats, OperationKind};
use chainlens_storage::{FeeStore as _, Store};

use crate::error::ProcessingError;

/// Operation kinds that carry fees worth aggregating.
pub const FEE_KINDS: [OperationKind; 4] = [
    OperationKind::Transaction,
    OperationKind::Origination,
    OperationKind::Delegation,
    OperationKind::Reveal,
];

pub struct FeeAggregator {
    store: Arc<dyn Store>,
    /// Window size: how many recent operations feed each aggregate.
    window: usize,
}

impl FeeAggregator {
    pub fn new(store: Arc<dyn Store>, window: usize) -> Self {
        Self {
            store,
            window: window.max(1),
        }
    }

    /// Compute low/mean/high over the most recent operations per kind and
    /// persist one aggregate row per kind that had any fees. Returns the
    /// number of aggregates written.
    pub async fn calculate_average_fees(&self) -> Result<usize, ProcessingError> {
        let now = Utc::now();
        let mut written = 0usize;

        for kind in FEE_KINDS {
            let fees = self
                .store
                .recent_fees(kind, self.window)
                .await
                .map_err(|e| ProcessingError::blocks(format!("reading {} fees", kind.as_str()), e))?;
            if fees.is_empty() {
                continue;
            }

            let (Some(&low), Some(&high)) = (fees.iter().min(), fees.iter().max()) else {
                continue;
            };
            let mean = fees.iter().sum::<u64>() / fees.len() as u64;

            self.store
                .write_fee_stats(&FeeStats {
                    kind,
                    low,
                    mean,
                    high,
                    timestamp: now,
                })
                .await
                .map_err(|e| {
                    ProcessingError::blocks(format!("writing {} fee stats", kind.as_str()), e)
                })?;
            written += 1;
            debug!(kind = kind.as_str(), low, mean, high, "fee aggregate written");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers;
    use crate::testing::{block_with_ops, transaction};
    use chainlens_storage::{BlockStore as _, BlockWrite, FeeStore as _, MemoryStore};

    async fn store_with_fees(fees: &[u64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let writes: Vec<BlockWrite> = fees
            .iter()
            .enumerate()
            .map(|(i, fee)| {
                let block = block_with_ops(
                    i as u64 + 1,
                    vec![transaction("tz1A", "tz1B", 100, *fee)],
                );
                let mut write = BlockWrite::for_block(mappers::block_row(&block));
                write.operations = mappers::operation_rows(&block);
                write
            })
            .collect();
        store.write_block_page(&writes).await.unwrap();
        store
    }

    #[tokio::test]
    async fn stats_cover_min_mean_max() {
        let store = store_with_fees(&[100, 200, 600]).await;
        let aggregator = FeeAggregator::new(store.clone(), 1_000);

        assert_eq!(aggregator.calculate_average_fees().await.unwrap(), 1);

        let stats = store
            .latest_fee_stats(OperationKind::Transaction)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.low, 100);
        assert_eq!(stats.high, 600);
        assert_eq!(stats.mean, 300);
    }

    #[tokio::test]
    async fn window_limits_the_sample() {
        // Newest-first window of 2 sees fees 200 and 600 only.
        let store = store_with_fees(&[100, 200, 600]).await;
        let aggregator = FeeAggregator::new(store.clone(), 2);
        aggregator.calculate_average_fees().await.unwrap();

        let stats = store
            .latest_fee_stats(OperationKind::Transaction)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.low, 200);
        assert_eq!(stats.high, 600);
        assert_eq!(stats.mean, 400);
    }

    #[tokio::test]
    async fn kinds_without_fees_write_nothing() {
        let store = Arc::new(MemoryStore::new());
        let aggregator = FeeAggregator::new(store.clone(), 10);
        assert_eq!(aggregator.calculate_average_fees().await.unwrap(), 0);
        assert!(store
            .latest_fee_stats(OperationKind::Origination)
            .await
            .unwrap()
            .is_none());
    }
}
