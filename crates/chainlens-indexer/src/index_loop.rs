//! The main indexing loop.
//!
//! Boot: wait for the node, start the periodic rights task, load pending
//! reset events (bounded to five seconds). Each cycle then applies resets,
//! processes the planned block pages in strict ascending order, recomputes
//! fees on its interval, and backfills rights timestamps. Failures are
//! fatal unless the failure-ignore policy is on, in which case the cycle is
//! logged and retried with the same reset carry-over. A shutdown signal
//! finishes the in-flight page, then runs the termination sequence.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use chainlens_core::config::{FetchDepth, NetworkConfig};
use chainlens_core::types::ResetEvent;
use chainlens_rpc::node::{BlockRef, NodeRpc};
use chainlens_storage::{BlockStore as _, ResetStore as _, Store};

use crate::accounts::{AccountsProcessor, BakersProcessor};
use crate::blocks::BlocksProcessor;
use crate::error::ProcessingError;
use crate::fees::FeeAggregator;
use crate::planner;
use crate::resets::AccountsResetHandler;
use crate::rights::{RightsConfig, RightsProcessor};
use crate::tokens::TokenRegistry;

/// Ceiling on the pending-reset load at boot.
const RESET_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IndexerLoop {
    node: Arc<dyn NodeRpc>,
    store: Arc<dyn Store>,
    blocks: BlocksProcessor,
    accounts: AccountsProcessor,
    bakers: BakersProcessor,
    rights: Arc<RightsProcessor>,
    resets: AccountsResetHandler,
    fees: FeeAggregator,
    config: NetworkConfig,
    /// Sourced from the environment at startup and passed in here; never a
    /// global.
    ignore_process_failures: bool,
    shutdown: watch::Receiver<bool>,
    task_stop: watch::Sender<bool>,
    rights_task: Option<JoinHandle<()>>,
}

impl IndexerLoop {
    pub fn new(
        node: Arc<dyn NodeRpc>,
        store: Arc<dyn Store>,
        config: NetworkConfig,
        ignore_process_failures: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let tokens = TokenRegistry::from_config(&config.token_contracts);
        let blocks = BlocksProcessor::new(store.clone(), tokens, config.tns_contract.clone());
        let accounts =
            AccountsProcessor::new(store.clone(), node.clone(), config.batch.accounts_size);
        let bakers = BakersProcessor::new(store.clone(), node.clone(), config.batch.accounts_size);
        let rights = Arc::new(RightsProcessor::new(
            store.clone(),
            node.clone(),
            RightsConfig {
                lookahead_cycles: config.lorre.rights_lookahead_cycles,
                blocks_per_cycle: config.lorre.blocks_per_cycle,
                seconds_per_block: config.lorre.seconds_per_block,
            },
        ));
        let resets = AccountsResetHandler::new(store.clone());
        let fees = FeeAggregator::new(store.clone(), config.lorre.fees_averaged);
        let (task_stop, _) = watch::channel(false);

        Self {
            node,
            store,
            blocks,
            accounts,
            bakers,
            rights,
            resets,
            fees,
            config,
            ignore_process_failures,
            shutdown,
            task_stop,
            rights_task: None,
        }
    }

    /// Run until done (bounded depths), fatal failure, or shutdown. The
    /// termination sequence always runs on the way out.
    pub async fn run(&mut self) -> Result<(), ProcessingError> {
        if !self.wait_for_node().await {
            self.termination_sequence().await;
            return Ok(());
        }

        self.rights_task = Some(self.rights.clone().spawn_scheduler(
            Duration::from_millis(self.config.lorre.rights_init_delay_ms),
            Duration::from_millis(self.config.lorre.rights_interval_ms),
            self.task_stop.subscribe(),
        ));

        let mut pending =
            match tokio::time::timeout(RESET_LOAD_TIMEOUT, self.load_pending_resets()).await {
                Ok(Ok(pending)) => pending,
                Ok(Err(e)) => {
                    self.termination_sequence().await;
                    return Err(e);
                }
                Err(_) => {
                    self.termination_sequence().await;
                    return Err(ProcessingError::blocks_message("reset event load timed out"));
                }
            };
        if !pending.is_empty() {
            info!(count = pending.len(), "reset events pending");
        }

        let mut iteration: u64 = 0;
        let result = loop {
            match self.run_cycle(iteration, &pending).await {
                Ok(unhandled) => pending = unhandled,
                Err(e) if self.ignore_process_failures => {
                    // Keep the same reset carry-over for the retry.
                    error!(iteration, error = %e, "cycle failed, continuing per failure policy");
                }
                Err(e) => break Err(e),
            }

            if self.config.depth != FetchDepth::Newest {
                info!(iteration, "bounded depth reached, indexing done");
                break Ok(());
            }
            if self.shutdown_requested() {
                info!("shutdown requested, leaving the cycle loop");
                break Ok(());
            }

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.config.lorre.sleep_interval_ms)) => {}
                _ = shutdown.changed() => {}
            }
            iteration += 1;
        };

        self.termination_sequence().await;
        result
    }

    /// One cycle: resets → blocks → fees (on interval) → rights timestamps.
    async fn run_cycle(
        &self,
        iteration: u64,
        pending: &[ResetEvent],
    ) -> Result<Vec<ResetEvent>, ProcessingError> {
        let unhandled = self.resets.apply_unhandled_resets(pending).await?;

        self.process_blocks().await?;

        if iteration % self.config.lorre.fee_update_interval.max(1) == 0 {
            self.fees.calculate_average_fees().await?;
        }

        self.rights.update_rights_timestamps().await?;
        Ok(unhandled)
    }

    /// Plan and process the cycle's block pages, strictly in ascending
    /// order, then let the checkpoint consumers catch up.
    async fn process_blocks(&self) -> Result<(), ProcessingError> {
        let head = self.resolve_head().await?;
        let l_db = self
            .store
            .max_level()
            .await
            .map_err(|e| ProcessingError::blocks("reading max level", e))?;

        let plan = planner::plan(
            self.config.depth,
            &head,
            l_db,
            self.config.head_hash.as_deref(),
            self.config.bootstrap_window,
            self.config.batch.page_size,
        );
        info!(
            head = head.level(),
            db = l_db,
            total = plan.total,
            pages = plan.pages.len(),
            "block fetch planned"
        );

        for page in &plan.pages {
            // Finish the in-flight page on shutdown, start no new one.
            if self.shutdown_requested() {
                info!("shutdown observed, not starting further pages");
                break;
            }
            let blocks = self.node.fetch_page(page).await.map_err(|e| {
                ProcessingError::blocks(format!("fetching page [{}, {}]", page.start, page.end), e)
            })?;
            self.blocks.process_blocks_page(&blocks).await?;
            self.rights.process_block_rights(&blocks).await?;
        }

        self.accounts.process_checkpoint().await?;
        self.bakers.process_checkpoint().await?;
        Ok(())
    }

    /// The head the planner works against. In anchored `Custom` mode the
    /// configured hash wins where the node can still resolve it.
    async fn resolve_head(&self) -> Result<chainlens_rpc::node::BlockData, ProcessingError> {
        if let (FetchDepth::Custom { .. }, Some(anchor)) =
            (self.config.depth, self.config.head_hash.as_deref())
        {
            match self.node.get_block(&BlockRef::Hash(anchor.to_string())).await {
                Ok(block) => return Ok(block),
                Err(e) => warn!(
                    anchor,
                    error = %e,
                    "configured head anchor unresolvable, falling back to the live head"
                ),
            }
        }
        self.node
            .get_block_head()
            .await
            .map_err(|e| ProcessingError::blocks("fetching head", e))
    }

    /// Bootup gate: probe the node until it answers. `false` means a
    /// shutdown arrived first.
    async fn wait_for_node(&self) -> bool {
        let per_attempt =
            Duration::from_millis(self.config.lorre.bootup_connection_check_timeout_ms);
        let retry = Duration::from_millis(self.config.lorre.bootup_retry_interval_ms);
        loop {
            if self.shutdown_requested() {
                return false;
            }
            match tokio::time::timeout(per_attempt, self.node.check_connection()).await {
                Ok(true) => {
                    info!("node connection established");
                    return true;
                }
                _ => warn!(
                    retry_ms = retry.as_millis() as u64,
                    "node unreachable, retrying"
                ),
            }
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(retry) => {}
                _ = shutdown.changed() => return false,
            }
        }
    }

    async fn load_pending_resets(&self) -> Result<Vec<ResetEvent>, ProcessingError> {
        let applied = self
            .store
            .applied_reset_levels()
            .await
            .map_err(|e| ProcessingError::blocks("loading applied resets", e))?;
        Ok(self
            .config
            .reset_events
            .iter()
            .filter(|e| !applied.contains(&e.activation_level))
            .cloned()
            .collect())
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop background tasks and release shared resources.
    async fn termination_sequence(&mut self) {
        info!("running termination sequence");
        let _ = self.task_stop.send(true);
        if let Some(handle) = self.rights_task.take() {
            let _ = handle.await;
        }
        self.store.close().await;
        info!("termination sequence complete");
    }
}
