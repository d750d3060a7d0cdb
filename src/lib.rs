//! EVM event relayer.
//!
//! Scans a root (factory) contract and every child contract it discovers
//! for configured events, decodes them against runtime-loaded ABIs, and
//! republishes each one exactly once onto a message bus — at-least-once
//! delivery with idempotent dedup on the consumer side.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Relay Loop (C7)                         │
//! │   poll latest block → fan out scan → decode → publish → mark    │
//! └───────────────┬─────────────────────────────────┬───────────────┘
//!                 │                                  │
//!                 ▼                                  ▼
//!     ┌───────────────────────┐          ┌───────────────────────┐
//!     │  RpcClient (C1)        │          │  ContractRegistry (C2) │
//!     │  FanoutScanner (C5)    │          │  EventExtractor (C4)   │
//!     └───────────────────────┘          └───────────────────────┘
//!                 │                                  │
//!                 ▼                                  ▼
//!     ┌───────────────────────┐          ┌───────────────────────┐
//!     │ CheckpointStore (C3)   │          │  EventPublisher (C6)   │
//!     │ SQLite or PostgreSQL   │          │  Apache Iggy           │
//!     └───────────────────────┘          └───────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] — domain entities and primitives
//! - [`error`] — layered error types (`DomainError`, `InfraError`, `AppError`, `ApiError`)
//! - [`config`] — settings loading and validation
//! - [`abi`] — runtime ABI loading and log decoding
//! - [`rpc`] — JSON-RPC client with rate-limit-aware retry (C1)
//! - [`registry`] — file-backed contract registry (C2)
//! - [`ports`] — trait boundaries for storage and streaming
//! - [`store`] — checkpoint/dedup persistence, SQLite and `PostgreSQL` (C3)
//! - [`indexer`] — event extraction, fan-out scanning, and the relay loop (C4/C5/C7)
//! - [`streaming`] — Apache Iggy publisher (C6)
//! - [`api`] — admin & health HTTP surface (C8)
//! - [`metrics`] — Prometheus export of the relay loop's counters

pub mod abi;
pub mod api;
pub mod config;
pub mod error;
pub mod indexer;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod streaming;
pub mod types;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string.
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().starts_with('0'));
    }
}
