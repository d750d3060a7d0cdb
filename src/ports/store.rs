//! Storage port for checkpoint/dedup persistence.
//!
//! This trait defines the contract C7 (the relay loop) and C8 (the admin
//! surface) depend on. Infrastructure adapters implement it against SQLite
//! (embedded) or PostgreSQL (networked).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::entities::{Checkpoint, ProcessedEvent};
use crate::types::primitives::EthAddress;

/// Port for checkpoint and processed-event persistence.
///
/// # Dedup contract
///
/// `mark_event_processed` is the dedup arbiter: a second call with the same
/// `event_id` MUST return `Ok(false)` rather than erroring, and this MUST
/// hold under concurrent callers racing on the same key (an embedded-store
/// implementation typically relies on a primary-key violation; a networked
/// store typically uses an atomic `INSERT ... ON CONFLICT DO NOTHING`).
///
/// # Implementation notes
///
/// Implementations should:
/// - Use an upsert for `save_checkpoint` keyed on `(chain_id, contract_address)`.
/// - Index `processed_events` on `(chain_id, block_number)` and `transaction_hash`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist (insert or update) a checkpoint.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Load the checkpoint for a `(chain_id, contract_address)` pair.
    ///
    /// Returns `None` if no checkpoint has been saved yet.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    async fn get_checkpoint(
        &self,
        chain_id: &str,
        contract_address: EthAddress,
    ) -> Result<Option<Checkpoint>>;

    /// Attempt to record an event as processed.
    ///
    /// Returns `Ok(true)` if this is the first time `event.event_id` has
    /// been recorded, `Ok(false)` if it was already present (an expected,
    /// counted-but-not-erroring outcome — not an error).
    ///
    /// # Errors
    /// Returns an error if the write itself fails for a reason other than
    /// the key already existing.
    async fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool>;

    /// Check whether an event has already been recorded as processed.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    /// Fetch processed events for a chain within a block range, most recent first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    async fn get_processed_events(
        &self,
        chain_id: &str,
        from_block: u64,
        to_block: u64,
        limit: u32,
    ) -> Result<Vec<ProcessedEvent>>;

    /// Delete processed-event records older than `older_than`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Release any held resources (connection pool, file handles).
    ///
    /// # Errors
    /// Returns an error if the underlying backend fails to close cleanly.
    async fn close(&self) -> Result<()>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockCheckpointStore;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::{Checkpoint, CheckpointStore, DateTime, EthAddress, ProcessedEvent, Result, Utc, async_trait};

    /// In-memory `CheckpointStore` for unit tests.
    #[derive(Debug, Default)]
    pub struct MockCheckpointStore {
        checkpoints: Mutex<HashMap<(String, EthAddress), Checkpoint>>,
        events: Mutex<HashMap<String, ProcessedEvent>>,
    }

    impl MockCheckpointStore {
        /// Create an empty mock store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CheckpointStore for MockCheckpointStore {
        async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
            self.checkpoints.lock().insert(
                (checkpoint.chain_id.clone(), checkpoint.contract_address),
                checkpoint.clone(),
            );
            Ok(())
        }

        async fn get_checkpoint(
            &self,
            chain_id: &str,
            contract_address: EthAddress,
        ) -> Result<Option<Checkpoint>> {
            Ok(self
                .checkpoints
                .lock()
                .get(&(chain_id.to_string(), contract_address))
                .cloned())
        }

        async fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool> {
            let mut events = self.events.lock();
            if events.contains_key(&event.event_id) {
                return Ok(false);
            }
            events.insert(event.event_id.clone(), event.clone());
            Ok(true)
        }

        async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
            Ok(self.events.lock().contains_key(event_id))
        }

        async fn get_processed_events(
            &self,
            chain_id: &str,
            from_block: u64,
            to_block: u64,
            limit: u32,
        ) -> Result<Vec<ProcessedEvent>> {
            let mut matches: Vec<ProcessedEvent> = self
                .events
                .lock()
                .values()
                .filter(|e| {
                    e.chain_id == chain_id && e.block_number >= from_block && e.block_number <= to_block
                })
                .cloned()
                .collect();
            matches.sort_by(|a, b| b.block_number.cmp(&a.block_number));
            matches.truncate(limit as usize);
            Ok(matches)
        }

        async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
            let mut events = self.events.lock();
            let before = events.len();
            events.retain(|_, e| e.processed_at >= older_than);
            Ok((before - events.len()) as u64)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn checkpoint_store_is_send_sync() {
        fn check<T: CheckpointStore>() {
            assert_send_sync::<T>();
        }
        check::<mock::MockCheckpointStore>();
    }

    #[tokio::test]
    async fn mock_store_dedup_gate() {
        let store = mock::MockCheckpointStore::new();
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
        let event = ProcessedEvent {
            event_id: ProcessedEvent::build_event_id("1", "0xabc", 0),
            chain_id: "1".into(),
            contract_address: addr,
            block_number: 10,
            transaction_hash: "0xabc".into(),
            log_index: 0,
            event_name: "Transfer".into(),
            processed_at: Utc::now(),
            published: true,
            metadata: serde_json::Value::Null,
        };

        assert!(store.mark_event_processed(&event).await.unwrap());
        assert!(!store.mark_event_processed(&event).await.unwrap());
        assert!(store.is_event_processed(&event.event_id).await.unwrap());
    }
}
