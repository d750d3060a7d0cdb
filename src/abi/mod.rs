//! Runtime ABI loading and event decoding.
//!
//! Contract ABIs arrive as operator-configured JSON strings
//! (`root_abi`/`child_abi`), not compile-time Solidity interfaces, so this
//! module decodes against [`alloy::json_abi::JsonAbi`] and
//! [`alloy::dyn_abi::DynSolValue`] rather than the `alloy::sol!` macro.
//!
//! # Usage
//!
//! ```ignore
//! use evm_event_relayer::abi::LoadedAbi;
//!
//! let abi = LoadedAbi::parse(&abi_json)?;
//! let decoded = abi.decode_log("Transfer", &log);
//! ```

use std::collections::BTreeMap;

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::B256;
use alloy::rpc::types::Log;
use tracing::warn;

use crate::error::{DomainError, Result};

/// A parsed contract ABI, ready to resolve event topics and decode logs.
#[derive(Debug, Clone)]
pub struct LoadedAbi {
    abi: JsonAbi,
}

impl LoadedAbi {
    /// Parse a contract ABI from its JSON representation.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAbi` if the JSON is not a valid ABI document.
    pub fn parse(abi_json: &str) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(abi_json)
            .map_err(|e| DomainError::InvalidAbi(e.to_string()))?;
        Ok(Self { abi })
    }

    /// Resolve a configured `root_abi`/`child_abi` value: a JSON array
    /// parses directly, anything else is treated as a file path and read
    /// from disk before parsing.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAbi` if the file cannot be read or its
    /// contents are not a valid ABI document.
    pub fn load(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.starts_with('[') {
            return Self::parse(trimmed);
        }
        let contents = std::fs::read_to_string(trimmed)
            .map_err(|e| DomainError::InvalidAbi(format!("reading ABI file {trimmed}: {e}")))?;
        Self::parse(&contents)
    }

    /// Look up an event definition by name.
    ///
    /// Returns `None` if the event is not present in this ABI — a common
    /// consequence of minor ABI drift in an actively developed contract
    /// fleet, not necessarily an error.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&Event> {
        self.abi.event(name).and_then(|events| events.first())
    }

    /// Topic0 (event signature hash) for a named event, if present.
    #[must_use]
    pub fn topic0(&self, name: &str) -> Option<B256> {
        self.event(name).map(Event::selector)
    }

    /// Decode a single log against the named event.
    ///
    /// Returns `None` (with a logged warning) if the event name is not
    /// present in this ABI, or if the log fails to decode against it.
    pub fn decode_log(&self, event_name: &str, log: &Log) -> Option<BTreeMap<String, String>> {
        let Some(event) = self.event(event_name) else {
            warn!(event_name, "event not found in configured ABI, skipping");
            return None;
        };

        let decoded = match event.decode_log_parts(log.topics().iter().copied(), log.data().data.as_ref()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(event_name, error = %e, "failed to decode log against ABI event");
                return None;
            }
        };

        let mut args = BTreeMap::new();
        for (param, value) in event
            .inputs
            .iter()
            .zip(decoded.indexed.iter().chain(decoded.body.iter()))
        {
            args.insert(param.name.clone(), render_value(value));
        }
        Some(args)
    }
}

/// Render a decoded ABI value as a display-friendly string.
///
/// Bytes and addresses render as `0x`-prefixed hex; everything else uses
/// its natural `Display`/debug form.
fn render_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(addr) => addr.to_string(),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::FixedBytes(bytes, _) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::Uint(value, _) | DynSolValue::Int(value, _) => value.to_string(),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TRANSFER_ABI: &str = r#"[
        {
            "type": "event",
            "name": "Transfer",
            "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}
            ],
            "anonymous": false
        }
    ]"#;

    #[test]
    fn parses_valid_abi() {
        let abi = LoadedAbi::parse(TRANSFER_ABI).unwrap();
        assert!(abi.event("Transfer").is_some());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(LoadedAbi::parse("not json").is_err());
    }

    #[test]
    fn missing_event_returns_none() {
        let abi = LoadedAbi::parse(TRANSFER_ABI).unwrap();
        assert!(abi.event("Approval").is_none());
        assert!(abi.topic0("Approval").is_none());
    }

    #[test]
    fn topic0_resolves_for_known_event() {
        let abi = LoadedAbi::parse(TRANSFER_ABI).unwrap();
        assert!(abi.topic0("Transfer").is_some());
    }
}
