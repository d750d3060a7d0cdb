//! Core relay logic: event extraction, fan-out scanning, and the main
//! polling loop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Relay Loop (C7)                         │
//! │                                                                 │
//! │  ┌──────────────────┐     ┌──────────────────┐                 │
//! │  │  FanoutScanner   │────▶│  EventExtractor  │                 │
//! │  │  (C5)            │     │  (C4)            │                 │
//! │  └──────────────────┘     └──────────────────┘                 │
//! │           │                                                     │
//! │           ▼                                                     │
//! │  ┌──────────────────┐     ┌──────────────────┐                 │
//! │  │ CheckpointStore  │     │ EventPublisher   │                 │
//! │  │ (dedup + commit) │     │ (C6)             │                 │
//! │  └──────────────────┘     └──────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod extractor;
pub mod fanout;
pub mod relay_loop;

pub use extractor::EventExtractor;
pub use fanout::{FanoutScanner, ScanOutcome};
pub use relay_loop::{RelayLoop, RelayState, RelayStateHandle, cleanup_task};
