//! Domain types for the event relayer.
//!
//! - [`primitives`] - Validated newtypes (`EthAddress`, `BlockNumber`)
//! - [`entities`] - Checkpoint, ProcessedEvent, RegistryEntry, DecodedEvent, Metrics

pub mod entities;
pub mod primitives;

pub use entities::{Checkpoint, DecodedEvent, Metrics, MetricsSnapshot, ProcessedEvent, RegistryEntry};
pub use primitives::{BlockNumber, EthAddress, InvalidAddress};
