//! Relay loop (C7): the main polling cycle that advances the chain
//! checkpoint, fans out event extraction, and publishes decoded events.
//!
//! Grounded in `original_source/integrations/relayers/escrow/
//! production_relayer.py`'s `_relay_loop`/`_process_block_range`/
//! `_cleanup_loop` for the cycle shape, and in the donor's
//! `BlockProcessor::start_polling` for the poll/sleep-at-the-bottom loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::abi::LoadedAbi;
use crate::config::RelaySettings;
use crate::error::Result;
use crate::indexer::fanout::FanoutScanner;
use crate::ports::{CheckpointStore, EventPublisher};
use crate::registry::ContractRegistry;
use crate::rpc::RpcClient;
use crate::types::entities::{Checkpoint, Metrics, ProcessedEvent};
use crate::types::primitives::EthAddress;

/// Lifecycle state of the relay loop. Readers (the admin surface) observe
/// this through [`RelayState::current`]; only the loop task ever writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Not yet started.
    Idle,
    /// Actively processing a window.
    Running,
    /// Between cycles, waiting on the poll timer.
    Sleeping,
    /// Shutdown signal received, winding down.
    ShuttingDown,
}

impl RelayState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Sleeping => 2,
            Self::ShuttingDown => 3,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Sleeping,
            3 => Self::ShuttingDown,
            _ => Self::Idle,
        }
    }
}

/// Shared, single-writer state handle for [`RelayState`].
#[derive(Debug, Clone)]
pub struct RelayStateHandle(Arc<AtomicU8>);

impl RelayStateHandle {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RelayState::Idle.to_u8())))
    }

    fn set(&self, state: RelayState) {
        self.0.store(state.to_u8(), Ordering::Relaxed);
    }

    /// Current state, as observed by any reader.
    #[must_use]
    pub fn current(&self) -> RelayState {
        RelayState::from_u8(self.0.load(Ordering::Relaxed))
    }
}

impl Default for RelayStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The main relay loop: polls for new blocks, fans out extraction across
/// the root and all registered child contracts, and publishes events.
pub struct RelayLoop {
    rpc: RpcClient,
    checkpoint_store: Arc<dyn CheckpointStore>,
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<ContractRegistry>,
    root_abi: LoadedAbi,
    child_abi: LoadedAbi,
    settings: RelaySettings,
    max_concurrent_requests: usize,
    metrics: Metrics,
    state: RelayStateHandle,
    shutdown: CancellationToken,
}

impl RelayLoop {
    /// Build a relay loop from its dependencies.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: RpcClient,
        checkpoint_store: Arc<dyn CheckpointStore>,
        publisher: Arc<dyn EventPublisher>,
        registry: Arc<ContractRegistry>,
        root_abi: LoadedAbi,
        child_abi: LoadedAbi,
        settings: RelaySettings,
        max_concurrent_requests: usize,
        metrics: Metrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            rpc,
            checkpoint_store,
            publisher,
            registry,
            root_abi,
            child_abi,
            settings,
            max_concurrent_requests,
            metrics,
            state: RelayStateHandle::new(),
            shutdown,
        }
    }

    /// Handle observers can poll to read the current [`RelayState`].
    #[must_use]
    pub fn state_handle(&self) -> RelayStateHandle {
        self.state.clone()
    }

    fn root_address(&self) -> Result<EthAddress> {
        Ok(EthAddress::from_hex(&self.settings.root_contract_address)?)
    }

    /// Run the relay loop until cancelled. Returns once the shutdown signal
    /// has been observed between cycles.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        self.state.set(RelayState::Running);
        self.metrics.set_running(true);
        let root_address = self.root_address()?;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle(root_address).await {
                Ok(sleep_for) => {
                    self.state.set(RelayState::Sleeping);
                    tokio::select! {
                        () = sleep(sleep_for) => {}
                        () = self.shutdown.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!(error = %e, "relay cycle failed, backing off");
                    self.metrics.record_error();
                    self.state.set(RelayState::Sleeping);
                    let backoff = self.settings.poll_interval() * 2;
                    tokio::select! {
                        () = sleep(backoff) => {}
                        () = self.shutdown.cancelled() => break,
                    }
                }
            }

            self.state.set(RelayState::Running);
        }

        self.state.set(RelayState::ShuttingDown);
        self.metrics.set_running(false);
        Ok(())
    }

    /// Run one poll cycle. Returns the sleep duration to use before the next cycle.
    async fn run_cycle(&self, root_address: EthAddress) -> Result<Duration> {
        let checkpoint = self
            .checkpoint_store
            .get_checkpoint(&self.settings.chain_id, root_address)
            .await?;

        let from = checkpoint
            .as_ref()
            .map_or(self.settings.start_block, |cp| cp.last_processed_block + 1);

        let latest = self.rpc.latest_block().await?;

        if from > latest {
            return Ok(self.settings.poll_interval());
        }

        let from = self.apply_catch_up(from, latest, &checkpoint);

        let window_to = (from + self.settings.batch_size - 1).min(latest);
        let mut current_from = from;
        let mut total_processed = checkpoint.as_ref().map_or(0, |cp| cp.total_events_processed);

        while current_from <= window_to {
            let current_to = (current_from + self.settings.batch_size - 1).min(window_to);
            let committed_to =
                self.process_sub_batch(root_address, current_from, current_to, &mut total_processed)
                    .await?;
            current_from = current_to + 1;

            if committed_to < current_to {
                // A poison event blocked the window; stop advancing this cycle.
                break;
            }
        }

        let blocks_behind = latest.saturating_sub(window_to);
        let sleep_for = adaptive_sleep(self.settings.poll_interval(), blocks_behind, self.settings.batch_size);
        Ok(sleep_for)
    }

    /// When far behind, jump the effective starting block forward rather
    /// than replaying deep history. Checked once per cycle, not oscillating.
    fn apply_catch_up(&self, from: u64, latest: u64, checkpoint: &Option<Checkpoint>) -> u64 {
        let Some(cp) = checkpoint else { return from };
        if latest.saturating_sub(cp.last_processed_block) > self.settings.auto_fast_forward_threshold {
            let jumped = latest.saturating_sub(100).max(cp.last_processed_block);
            if jumped > from {
                warn!(
                    from,
                    jumped, "far behind chain tip, fast-forwarding past deep history"
                );
                return jumped + 1;
            }
        }
        from
    }

    /// Process one sub-batch `[from, to]`: scan, dedup-check, publish, mark.
    ///
    /// Returns the highest block number that may be safely committed as the
    /// new checkpoint. If every event in the window published successfully
    /// this is `to`; otherwise it is clamped to one block before the lowest
    /// failing event's block, so the remainder is re-scanned next cycle.
    #[instrument(skip(self, total_processed), fields(from, to))]
    async fn process_sub_batch(
        &self,
        root_address: EthAddress,
        from: u64,
        to: u64,
        total_processed: &mut u64,
    ) -> Result<u64> {
        let scanner = FanoutScanner::new(
            &self.rpc,
            &self.registry,
            root_address,
            &self.root_abi,
            &self.settings.event_names_root,
            &self.child_abi,
            &self.settings.event_names_child,
            self.max_concurrent_requests,
        );

        let registry_count_before = self.registry.count();
        let outcome = scanner.scan(from, to).await?;
        for _ in 0..outcome.errors_count {
            self.metrics.record_error();
        }

        let mut first_failing_block: Option<u64> = None;

        for event in &outcome.events {
            let event_id = event.event_id(&self.settings.chain_id);

            if self.checkpoint_store.is_event_processed(&event_id).await? {
                continue;
            }

            match self.publisher.publish(&self.settings.chain_id, event).await {
                Ok(_message_id) => {
                    let processed = ProcessedEvent {
                        event_id,
                        chain_id: self.settings.chain_id.clone(),
                        contract_address: event.contract_address,
                        block_number: event.block_number,
                        transaction_hash: event.transaction_hash.clone(),
                        log_index: event.log_index,
                        event_name: event.event_name.clone(),
                        processed_at: Utc::now(),
                        published: true,
                        metadata: serde_json::json!({ "args": event.args }),
                    };
                    if self.checkpoint_store.mark_event_processed(&processed).await? {
                        *total_processed += 1;
                        self.metrics.record_event_processed();
                        self.metrics.record_event_published();
                    }
                }
                Err(e) => {
                    warn!(
                        event_id = %event_id,
                        error = %e,
                        "publish failed, event will not be marked processed"
                    );
                    self.metrics.record_error();
                    first_failing_block = Some(
                        first_failing_block.map_or(event.block_number, |b| b.min(event.block_number)),
                    );
                }
            }
        }

        if self.registry.count() != registry_count_before {
            self.registry.save()?;
        }

        let committed_to = match first_failing_block {
            Some(failing_block) => failing_block.saturating_sub(1).max(from.saturating_sub(1)),
            None => to,
        };

        let checkpoint = Checkpoint {
            chain_id: self.settings.chain_id.clone(),
            contract_address: root_address,
            last_processed_block: committed_to,
            last_processed_at: Utc::now(),
            total_events_processed: *total_processed,
            metadata: serde_json::Value::Null,
        };
        self.checkpoint_store.save_checkpoint(&checkpoint).await?;
        self.metrics.record_checkpoint(committed_to);

        Ok(committed_to)
    }
}

/// Sleep between `poll_interval/3` and `poll_interval` depending on lag,
/// clamped to a 0.5s floor regardless of how far behind the chain tip is.
fn adaptive_sleep(poll_interval: Duration, blocks_behind: u64, batch_size: u64) -> Duration {
    let floor = Duration::from_millis(500);
    if blocks_behind <= batch_size {
        return poll_interval.max(floor);
    }
    (poll_interval / 3).max(floor)
}

/// Background cleanup task: periodically removes processed-event rows
/// older than the retention window.
#[instrument(skip(checkpoint_store, shutdown))]
pub async fn cleanup_task(
    checkpoint_store: Arc<dyn CheckpointStore>,
    interval: Duration,
    retention_days: i64,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.cancelled() => return,
        }

        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        match checkpoint_store.cleanup_old_events(cutoff).await {
            Ok(removed) => info!(removed, "cleaned up old processed events"),
            Err(e) => error!(error = %e, "cleanup cycle failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_sleep_uses_full_interval_when_caught_up() {
        let interval = Duration::from_secs(12);
        assert_eq!(adaptive_sleep(interval, 0, 5), interval);
    }

    #[test]
    fn adaptive_sleep_shortens_when_behind() {
        let interval = Duration::from_secs(12);
        let sleep_duration = adaptive_sleep(interval, 1000, 5);
        assert!(sleep_duration < interval);
        assert!(sleep_duration >= Duration::from_millis(500));
    }

    #[test]
    fn adaptive_sleep_never_below_floor() {
        let interval = Duration::from_millis(100);
        let sleep_duration = adaptive_sleep(interval, 1000, 5);
        assert_eq!(sleep_duration, Duration::from_millis(500));
    }

    #[test]
    fn relay_state_round_trips_through_handle() {
        let handle = RelayStateHandle::new();
        assert_eq!(handle.current(), RelayState::Idle);
        handle.set(RelayState::Running);
        assert_eq!(handle.current(), RelayState::Running);
        handle.set(RelayState::ShuttingDown);
        assert_eq!(handle.current(), RelayState::ShuttingDown);
    }
}
