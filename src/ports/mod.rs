//! Port definitions for dependency injection and testability.
//!
//! Ports are trait definitions that describe what the domain layer needs.
//! Following hexagonal architecture, adapters (in the infrastructure layer)
//! implement these traits to provide concrete functionality.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Domain Layer                            │
//! │                                                                 │
//! │  Uses ports (traits) to define what it needs                   │
//! │                                                                 │
//! │  ┌─────────────────┐         ┌─────────────────┐               │
//! │  │ CheckpointStore │         │  EventPublisher  │               │
//! │  └────────┬────────┘         └────────┬─────────┘               │
//! │           │                           │                         │
//! └───────────┼───────────────────────────┼─────────────────────────┘
//!             │                           │
//!             ▼                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Infrastructure Layer                        │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────┐       │
//! │  │SqliteCheckpoint│ │PostgresCheckpoint│ │  IggyPublisher │     │
//! │  │    Store       │ │     Store        │ │                │     │
//! │  └──────────────┘  └──────────────┘  └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Port Categories
//!
//! | Category | Ports | Purpose |
//! |----------|-------|---------|
//! | Storage | [`CheckpointStore`] | Checkpoint and dedup persistence |
//! | Streaming | [`EventPublisher`] | Publishing decoded events to the bus |
//! | Time | [`Clock`] | Testable time operations |
//!
//! # Usage
//!
//! ```ignore
//! use evm_event_relayer::ports::{CheckpointStore, Clock, SystemClock};
//!
//! // Application code depends on traits, not implementations
//! async fn relay_cycle<S: CheckpointStore, C: Clock>(store: &S, clock: &C) {
//!     let now = clock.now();
//!     // ...
//! }
//!
//! // In production, use real implementations
//! let store = SqliteCheckpointStore::new(pool);
//! let clock = SystemClock;
//!
//! // In tests, use mocks
//! let store = MockCheckpointStore::new();
//! let clock = FakeClock::new(fixed_time);
//! ```

mod clock;
mod store;
mod streaming;

pub use clock::{Clock, SystemClock};
pub use store::CheckpointStore;
pub use streaming::EventPublisher;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::FakeClock;
#[cfg(any(test, feature = "test-utils"))]
pub use store::MockCheckpointStore;
#[cfg(any(test, feature = "test-utils"))]
pub use streaming::{MockEventPublisher, NoOpPublisher};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ports_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        fn check_checkpoint_store<T: CheckpointStore>() {
            assert_send_sync::<T>();
        }
        fn check_event_publisher<T: EventPublisher>() {
            assert_send_sync::<T>();
        }
        fn check_clock<T: Clock>() {
            assert_send_sync::<T>();
        }

        check_checkpoint_store::<store::MockCheckpointStore>();
        check_event_publisher::<streaming::mocks::MockEventPublisher>();
        check_clock::<SystemClock>();
    }
}
