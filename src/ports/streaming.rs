//! Streaming port for event publishing.
//!
//! Defines the contract for publishing decoded events onto a message bus
//! (e.g. Apache Iggy, Kafka, Redis Streams).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::entities::DecodedEvent;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT PUBLISHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for publishing decoded events to the message bus.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Retry transient failures with exponential backoff up to a configured
///   `max_retries`, bounding each attempt with a timeout.
/// - Return the bus-assigned message id on success so the caller can log it.
/// - Leave the decision of whether to mark the event processed to the
///   caller — a publish failure here is not itself a dedup decision.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one decoded event for the given chain.
    ///
    /// Returns the bus-assigned message id on success.
    ///
    /// # Errors
    /// Returns an error if publishing fails after retries are exhausted.
    async fn publish(&self, chain_id: &str, event: &DecodedEvent) -> Result<String>;

    /// Check if the publisher currently holds a live connection.
    fn is_connected(&self) -> bool;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mocks::{MockEventPublisher, NoOpPublisher};

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    //! Mock implementations for testing.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::{DecodedEvent, EventPublisher, Result, async_trait};

    /// Publisher that always succeeds and discards the event.
    ///
    /// Used as the publisher adapter when no message bus is configured, or
    /// in integration tests that only assert on the checkpoint/dedup side.
    #[derive(Debug, Clone, Default)]
    pub struct NoOpPublisher;

    #[async_trait]
    impl EventPublisher for NoOpPublisher {
        async fn publish(&self, chain_id: &str, event: &DecodedEvent) -> Result<String> {
            Ok(event.event_id(chain_id))
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    /// Mock publisher that counts calls and can be told to fail.
    #[derive(Debug, Clone)]
    pub struct MockEventPublisher {
        /// Number of events successfully published.
        pub publish_count: Arc<AtomicUsize>,
        /// Whether to simulate a live connection.
        pub connected: Arc<AtomicBool>,
        /// Whether to fail the next (and subsequent) publishes.
        pub should_fail: Arc<AtomicBool>,
    }

    impl Default for MockEventPublisher {
        fn default() -> Self {
            Self {
                publish_count: Arc::new(AtomicUsize::new(0)),
                connected: Arc::new(AtomicBool::new(true)),
                should_fail: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl MockEventPublisher {
        /// Create a new mock publisher.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of events successfully published so far.
        #[must_use]
        pub fn count(&self) -> usize {
            self.publish_count.load(Ordering::SeqCst)
        }

        /// Simulate a connection drop or recovery.
        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
        }

        /// Force subsequent publishes to fail (or stop failing).
        pub fn set_should_fail(&self, should_fail: bool) {
            self.should_fail.store(should_fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl EventPublisher for MockEventPublisher {
        async fn publish(&self, chain_id: &str, event: &DecodedEvent) -> Result<String> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(crate::error::AppError::Infra(crate::error::InfraError::Publish {
                    transient: true,
                    source: "mock publish failure".into(),
                }));
            }
            self.publish_count.fetch_add(1, Ordering::SeqCst);
            Ok(event.event_id(chain_id))
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::mocks::{MockEventPublisher, NoOpPublisher};
    use super::*;
    use crate::types::primitives::EthAddress;

    fn sample_event() -> DecodedEvent {
        DecodedEvent {
            contract_address: EthAddress::from_hex("0x1234567890123456789012345678901234567890")
                .expect("valid address"),
            event_name: "Transfer".into(),
            block_number: 10,
            transaction_hash: "0xabc".into(),
            log_index: 0,
            args: Default::default(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_publisher_counts_events() {
        let publisher = MockEventPublisher::new();
        assert_eq!(publisher.count(), 0);

        let id = publisher.publish("1", &sample_event()).await.expect("publish");
        assert_eq!(id, "1:0xabc:0");
        assert_eq!(publisher.count(), 1);

        publisher.set_connected(false);
        assert!(!publisher.is_connected());
    }

    #[tokio::test]
    async fn mock_publisher_can_be_told_to_fail() {
        let publisher = MockEventPublisher::new();
        publisher.set_should_fail(true);
        assert!(publisher.publish("1", &sample_event()).await.is_err());
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn noop_publisher_always_succeeds() {
        let publisher = NoOpPublisher;
        let id = publisher.publish("1", &sample_event()).await.expect("publish");
        assert_eq!(id, "1:0xabc:0");
    }
}
