//! File-backed contract registry (C2): tracks child contract addresses
//! discovered by the fan-out scanner so future cycles know who to query.
//!
//! Persistence is a single JSON document, written to a temp file and
//! renamed into place so a crash mid-write never leaves a corrupt
//! registry on disk. Mutation is serialized by an internal lock; `save`
//! is idempotent.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{InfraError, Result};
use crate::types::primitives::EthAddress;

#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    escrows: Vec<EthAddress>,
    saved_at: chrono::DateTime<Utc>,
    chain_id: String,
}

/// In-memory registry of discovered child contract addresses, backed by a
/// single JSON file on disk.
#[derive(Debug)]
pub struct ContractRegistry {
    path: PathBuf,
    chain_id: String,
    addresses: Mutex<BTreeSet<EthAddress>>,
}

impl ContractRegistry {
    /// Create an empty registry backed by `path`. Call [`Self::load`] to
    /// populate it from disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, chain_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            chain_id: chain_id.into(),
            addresses: Mutex::new(BTreeSet::new()),
        }
    }

    /// Add an address to the registry.
    ///
    /// Returns `true` if the address was not already present.
    pub fn add(&self, address: EthAddress) -> bool {
        let newly_inserted = self.addresses.lock().insert(address);
        if newly_inserted {
            info!(address = %address, "registry admitted new contract");
        }
        newly_inserted
    }

    /// Snapshot of all addresses currently in the registry.
    #[must_use]
    pub fn all(&self) -> Vec<EthAddress> {
        self.addresses.lock().iter().copied().collect()
    }

    /// Number of addresses currently in the registry.
    #[must_use]
    pub fn count(&self) -> usize {
        self.addresses.lock().len()
    }

    /// Persist the registry to disk, writing to a temp file and renaming
    /// it into place so readers never observe a partial write.
    ///
    /// # Errors
    /// Returns an error if the temp file cannot be written or renamed.
    #[instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        let escrows: Vec<EthAddress> = self.addresses.lock().iter().copied().collect();
        let doc = RegistryDocument {
            escrows,
            saved_at: Utc::now(),
            chain_id: self.chain_id.clone(),
        };
        let json = serde_json::to_string_pretty(&doc).map_err(InfraError::Serialization)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(InfraError::RegistryIo)?;
        fs::rename(&tmp_path, &self.path).map_err(InfraError::RegistryIo)?;
        Ok(())
    }

    /// Load the registry from disk, replacing the in-memory contents.
    ///
    /// A missing file is treated as an empty registry, not an error.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<()> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.addresses.lock().clear();
                return Ok(());
            }
            Err(e) => return Err(InfraError::RegistryIo(e).into()),
        };

        let doc: RegistryDocument =
            serde_json::from_str(&contents).map_err(InfraError::Serialization)?;
        *self.addresses.lock() = doc.escrows.into_iter().collect();
        Ok(())
    }

    /// Path this registry persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("registry_test_{name}_{}.json", std::process::id()))
    }

    #[test]
    fn add_returns_true_only_for_new_address() {
        let registry = ContractRegistry::new(temp_path("add"), "1");
        let addr = EthAddress::from_hex("0x1111111111111111111111111111111111111111").unwrap();

        assert!(registry.add(addr));
        assert!(!registry.add(addr));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn load_tolerates_missing_file() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);
        let registry = ContractRegistry::new(&path, "1");

        registry.load().unwrap();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_path("roundtrip");
        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(path.with_extension("json.tmp"));

        let addr_a = EthAddress::from_hex("0x1111111111111111111111111111111111111111").unwrap();
        let addr_b = EthAddress::from_hex("0x2222222222222222222222222222222222222222").unwrap();

        {
            let registry = ContractRegistry::new(&path, "1");
            registry.add(addr_a);
            registry.add(addr_b);
            registry.save().unwrap();
        }

        let reloaded = ContractRegistry::new(&path, "1");
        reloaded.load().unwrap();
        assert_eq!(reloaded.count(), 2);
        assert!(reloaded.all().contains(&addr_a));
        assert!(reloaded.all().contains(&addr_b));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_is_idempotent() {
        let path = temp_path("idempotent");
        let _ = fs::remove_file(&path);

        let registry = ContractRegistry::new(&path, "1");
        let addr = EthAddress::from_hex("0x3333333333333333333333333333333333333333").unwrap();
        registry.add(addr);

        registry.save().unwrap();
        registry.save().unwrap();

        let reloaded = ContractRegistry::new(&path, "1");
        reloaded.load().unwrap();
        assert_eq!(reloaded.count(), 1);

        let _ = fs::remove_file(&path);
    }
}
