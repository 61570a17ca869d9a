//! HTTP node client backed by `reqwest`.
//!
//! Every call carries a deadline; transient failures (connection errors,
//! 5xx, deadline exceeded) are retried with exponential backoff until the
//! configured budget runs out. Malformed payloads are never retried.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use chainlens_core::config::{BatchConfig, NodeConfig};

use crate::error::NodeError;
use crate::node::{
    AccountData, BakerData, BakingRightData, BlockData, BlockRef, EndorsingRightData, LevelRange,
    NodeRpc,
};

/// Ceiling on the sleep between retries; the delay doubles per failure
/// until it hits this.
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Production node client.
pub struct TezosNodeClient {
    base: String,
    http: reqwest::Client,
    /// Transient failures tolerated per call before giving up.
    retry_budget: u32,
    first_backoff: Duration,
    page_size: u64,
    concurrency: usize,
}

/// The sleep after one more failure: double, capped.
fn grow_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(BACKOFF_CAP)
}

impl TezosNodeClient {
    pub fn new(node: &NodeConfig, batch: &BatchConfig) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(node.timeout_ms))
            .build()
            .map_err(|e| NodeError::Network(format!("building http client: {e}")))?;

        Ok(Self {
            base: node.url.trim_end_matches('/').to_string(),
            http,
            retry_budget: node.retry_count,
            first_backoff: Duration::from_millis(node.retry_backoff_ms),
            page_size: batch.page_size,
            concurrency: batch.node_requests_concurrency.max(1),
        })
    }

    async fn get_once(&self, url: &str) -> Result<Value, NodeError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| NodeError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NodeError::Network(format!("HTTP {status}: {body}")));
        }

        // Body arrived intact; a parse failure from here on is a payload
        // problem, not a transport problem.
        let text = resp
            .text()
            .await
            .map_err(|e| NodeError::Network(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| NodeError::Decode(e.to_string()))
    }

    /// GET a node path. Transient failures sleep and retry with a doubling
    /// delay until the budget runs out; decode failures return immediately.
    async fn get_json(&self, path: &str) -> Result<Value, NodeError> {
        let url = format!("{}/{}", self.base, path);
        let mut failures = 0u32;
        let mut backoff = self.first_backoff;
        loop {
            match self.get_once(&url).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && failures < self.retry_budget => {
                    failures += 1;
                    tracing::warn!(
                        failures,
                        budget = self.retry_budget,
                        delay_ms = backoff.as_millis() as u64,
                        error = %e,
                        path,
                        "transient node failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = grow_backoff(backoff);
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(failures, error = %e, path, "retry budget exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn get_decoded<T: DeserializeOwned>(&self, path: &str) -> Result<T, NodeError> {
        let value = self.get_json(path).await?;
        decode(value, path)
    }

    async fn block_at_level(&self, level: u64) -> Result<BlockData, NodeError> {
        self.get_decoded(&format!("chains/main/blocks/{level}")).await
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, NodeError> {
    serde_json::from_value(value).map_err(|e| NodeError::Decode(format!("{what}: {e}")))
}

#[async_trait]
impl NodeRpc for TezosNodeClient {
    async fn get_block(&self, block: &BlockRef) -> Result<BlockData, NodeError> {
        self.get_decoded(&format!("chains/main/blocks/{block}")).await
    }

    async fn get_block_head(&self) -> Result<BlockData, NodeError> {
        self.get_block(&BlockRef::Head).await
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }

    async fn fetch_page(&self, page: &LevelRange) -> Result<Vec<BlockData>, NodeError> {
        let levels: Vec<u64> = page.levels().collect();
        let results: Vec<Result<BlockData, NodeError>> = stream::iter(levels)
            .map(|level| self.block_at_level(level))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut blocks = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        blocks.sort_by_key(BlockData::level);
        Ok(blocks)
    }

    async fn get_accounts_at(
        &self,
        level: u64,
        ids: &[String],
    ) -> Result<Vec<(String, AccountData)>, NodeError> {
        let results: Vec<Result<(String, AccountData), NodeError>> = stream::iter(ids.to_vec())
            .map(|id| async move {
                let data = self
                    .get_decoded(&format!("chains/main/blocks/{level}/context/contracts/{id}"))
                    .await?;
                Ok((id, data))
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.into_iter().collect()
    }

    async fn get_bakers_at(
        &self,
        level: u64,
        ids: &[String],
    ) -> Result<Vec<(String, BakerData)>, NodeError> {
        let results: Vec<Result<(String, BakerData), NodeError>> = stream::iter(ids.to_vec())
            .map(|id| async move {
                let data = self
                    .get_decoded(&format!("chains/main/blocks/{level}/context/delegates/{id}"))
                    .await?;
                Ok((id, data))
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.into_iter().collect()
    }

    async fn get_baking_rights(&self, cycle: u64) -> Result<Vec<BakingRightData>, NodeError> {
        self.get_decoded(&format!(
            "chains/main/blocks/head/helpers/baking_rights?cycle={cycle}"
        ))
        .await
    }

    async fn get_endorsing_rights(&self, cycle: u64) -> Result<Vec<EndorsingRightData>, NodeError> {
        self.get_decoded(&format!(
            "chains/main/blocks/head/helpers/endorsing_rights?cycle={cycle}"
        ))
        .await
    }
}
