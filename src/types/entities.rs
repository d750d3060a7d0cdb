//! Domain entities persisted or exchanged across component boundaries.
//!
//! These are plain owned structs: they cross the store-port boundary by
//! value rather than by reference, matching the shape of the rows they are
//! read from and the JSON bodies they are published as.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::primitives::EthAddress;

/// Per-`(chain_id, contract_address)` scan progress marker.
///
/// `last_processed_block` is monotonically non-decreasing under normal
/// operation; a rewind via the admin surface is the only sanctioned
/// exception, and that path logs a `warn!` when it happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain identifier this checkpoint belongs to.
    pub chain_id: String,
    /// Contract address being tracked (the root contract).
    pub contract_address: EthAddress,
    /// Highest block number fully processed.
    pub last_processed_block: u64,
    /// When the checkpoint was last updated.
    pub last_processed_at: DateTime<Utc>,
    /// Running total of events processed under this checkpoint.
    pub total_events_processed: u64,
    /// Opaque bag of extra bookkeeping (e.g. events-in-batch, checkpoint time).
    pub metadata: Value,
}

impl Checkpoint {
    /// Construct a fresh checkpoint at the given starting block.
    #[must_use]
    pub fn new(chain_id: impl Into<String>, contract_address: EthAddress, start_block: u64) -> Self {
        Self {
            chain_id: chain_id.into(),
            contract_address,
            last_processed_block: start_block,
            last_processed_at: Utc::now(),
            total_events_processed: 0,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }
}

/// Dedup record for a single processed event.
///
/// `event_id` is the globally unique key `chain_id ":" tx_hash ":" log_index`.
/// The store enforces uniqueness on this key; that enforcement is the
/// dedup mechanism, not an application-level check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// Globally unique dedup key.
    pub event_id: String,
    /// Chain identifier.
    pub chain_id: String,
    /// Contract that emitted the event.
    pub contract_address: EthAddress,
    /// Block the event was mined in.
    pub block_number: u64,
    /// Transaction hash (0x-prefixed hex).
    pub transaction_hash: String,
    /// Log index within the transaction's receipt.
    pub log_index: u64,
    /// Event name as decoded from the ABI.
    pub event_name: String,
    /// When this record was written.
    pub processed_at: DateTime<Utc>,
    /// Whether the event was successfully published to the bus.
    pub published: bool,
    /// Opaque bag of extra bookkeeping.
    pub metadata: Value,
}

impl ProcessedEvent {
    /// Build the globally unique dedup key for a (chain, tx, log index) triple.
    #[must_use]
    pub fn build_event_id(chain_id: &str, transaction_hash: &str, log_index: u64) -> String {
        format!("{chain_id}:{transaction_hash}:{log_index}")
    }
}

/// A contract address admitted into the fan-out scan set.
///
/// Membership is monotonic within a run: entries are added by C5, never
/// removed, and persisted to a single JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryEntry(pub EthAddress);

impl RegistryEntry {
    /// Wrap an address as a registry entry.
    #[must_use]
    pub const fn new(address: EthAddress) -> Self {
        Self(address)
    }

    /// The wrapped address.
    #[must_use]
    pub const fn address(&self) -> EthAddress {
        self.0
    }
}

impl From<EthAddress> for RegistryEntry {
    fn from(address: EthAddress) -> Self {
        Self::new(address)
    }
}

/// A single decoded on-chain log, transient and in-memory only.
///
/// Lives for the duration of one scan cycle: C4 produces it, C5 collects
/// and orders it, C7 consumes it into a publish-then-mark attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Contract that emitted the event.
    pub contract_address: EthAddress,
    /// Event name as resolved from the ABI.
    pub event_name: String,
    /// Block the event was mined in.
    pub block_number: u64,
    /// Transaction hash (0x-prefixed hex).
    pub transaction_hash: String,
    /// Log index within the transaction's receipt.
    pub log_index: u64,
    /// Decoded argument values, stringified, in declaration order.
    pub args: BTreeMap<String, String>,
    /// Block timestamp, if known at decode time.
    pub timestamp: DateTime<Utc>,
}

impl DecodedEvent {
    /// The dedup key this event will be recorded under once processed.
    #[must_use]
    pub fn event_id(&self, chain_id: &str) -> String {
        ProcessedEvent::build_event_id(chain_id, &self.transaction_hash, self.log_index)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METRICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-local counters, owned exclusively by the relay loop (C7) and
/// exposed read-only to the admin surface (C8).
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// When the relay loop started.
    pub started_at: DateTime<Utc>,
    /// Whether the relay loop is currently mid-cycle.
    pub is_running: bool,
    /// Total events successfully processed (published and marked) since start.
    pub total_events_processed: u64,
    /// Total events successfully published since start.
    pub total_events_published: u64,
    /// Highest block number the checkpoint has advanced to.
    pub last_processed_block: u64,
    /// When the checkpoint was last saved.
    pub last_checkpoint_time: Option<DateTime<Utc>>,
    /// Count of errors encountered (RPC, store, publish) since start.
    pub errors_count: u64,
    /// Seconds the process has been running.
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct MetricsInner {
    started_at: DateTime<Utc>,
    is_running: bool,
    total_events_processed: u64,
    total_events_published: u64,
    last_processed_block: u64,
    last_checkpoint_time: Option<DateTime<Utc>>,
    errors_count: u64,
}

/// Shared, cheaply-cloneable handle to the relay loop's counters.
///
/// Single writer (the relay loop task), many readers (the admin surface),
/// matching the donor's single-writer/many-reader metrics shape.
#[derive(Debug, Clone)]
pub struct Metrics(Arc<RwLock<MetricsInner>>);

impl Metrics {
    /// Create a fresh set of counters, timestamped now.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(MetricsInner {
            started_at: Utc::now(),
            is_running: false,
            total_events_processed: 0,
            total_events_published: 0,
            last_processed_block: 0,
            last_checkpoint_time: None,
            errors_count: 0,
        })))
    }

    /// Mark the loop as having entered or left a scan cycle.
    pub fn set_running(&self, running: bool) {
        self.0.write().is_running = running;
    }

    /// Record one successfully published-and-marked event.
    pub fn record_event_processed(&self) {
        let mut inner = self.0.write();
        inner.total_events_processed += 1;
    }

    /// Record one successfully published event (regardless of mark outcome).
    pub fn record_event_published(&self) {
        let mut inner = self.0.write();
        inner.total_events_published += 1;
    }

    /// Record a checkpoint advancement.
    pub fn record_checkpoint(&self, block: u64) {
        let mut inner = self.0.write();
        inner.last_processed_block = block;
        inner.last_checkpoint_time = Some(Utc::now());
    }

    /// Increment the error counter.
    pub fn record_error(&self) {
        self.0.write().errors_count += 1;
    }

    /// Take an immutable snapshot suitable for serializing to the admin surface.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.0.read();
        let uptime_secs: u64 = (Utc::now() - inner.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs();
        MetricsSnapshot {
            started_at: inner.started_at,
            is_running: inner.is_running,
            total_events_processed: inner.total_events_processed,
            total_events_published: inner.total_events_published,
            last_processed_block: inner.last_processed_block,
            last_checkpoint_time: inner.last_checkpoint_time,
            errors_count: inner.errors_count,
            uptime_secs,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_id_format() {
        let id = ProcessedEvent::build_event_id("1", "0xabc", 7);
        assert_eq!(id, "1:0xabc:7");
    }

    #[test]
    fn metrics_snapshot_reflects_writes() {
        let metrics = Metrics::new();
        metrics.set_running(true);
        metrics.record_event_published();
        metrics.record_event_processed();
        metrics.record_checkpoint(42);
        metrics.record_error();

        let snap = metrics.snapshot();
        assert!(snap.is_running);
        assert_eq!(snap.total_events_published, 1);
        assert_eq!(snap.total_events_processed, 1);
        assert_eq!(snap.last_processed_block, 42);
        assert_eq!(snap.errors_count, 1);
        assert!(snap.last_checkpoint_time.is_some());
    }

    #[test]
    fn checkpoint_new_defaults() {
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
        let checkpoint = Checkpoint::new("1", addr, 100);
        assert_eq!(checkpoint.last_processed_block, 100);
        assert_eq!(checkpoint.total_events_processed, 0);
    }

    #[test]
    fn registry_entry_from_address() {
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
        let entry: RegistryEntry = addr.into();
        assert_eq!(entry.address(), addr);
    }
}
