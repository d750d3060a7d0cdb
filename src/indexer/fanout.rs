//! Fan-out scanner (C5): discovers child contracts from the root/factory
//! contract's discovery events, then concurrently extracts the full
//! event-set of every known child, bounded by a semaphore.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::abi::LoadedAbi;
use crate::indexer::extractor::EventExtractor;
use crate::registry::ContractRegistry;
use crate::rpc::RpcClient;
use crate::types::entities::DecodedEvent;
use crate::types::primitives::EthAddress;

/// Result of scanning one `[from_block, to_block]` window.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// All decoded events across the root contract and every child.
    pub events: Vec<DecodedEvent>,
    /// Number of per-target query failures encountered (logged, not fatal).
    pub errors_count: u64,
}

/// Scans the root contract plus every registered child contract for a
/// block window, bounding child-contract concurrency.
#[derive(Debug)]
pub struct FanoutScanner<'a> {
    rpc: &'a RpcClient,
    registry: &'a ContractRegistry,
    root_contract_address: EthAddress,
    root_abi: &'a LoadedAbi,
    event_names_root: &'a [String],
    child_abi: &'a LoadedAbi,
    event_names_child: &'a [String],
    semaphore: Arc<Semaphore>,
}

impl<'a> FanoutScanner<'a> {
    /// Build a scanner bounding child-contract concurrency to `max_concurrent_requests`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: &'a RpcClient,
        registry: &'a ContractRegistry,
        root_contract_address: EthAddress,
        root_abi: &'a LoadedAbi,
        event_names_root: &'a [String],
        child_abi: &'a LoadedAbi,
        event_names_child: &'a [String],
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            rpc,
            registry,
            root_contract_address,
            root_abi,
            event_names_root,
            child_abi,
            event_names_child,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    /// Scan `[from_block, to_block]`: discover new children from the root
    /// contract, then extract every event from every known child. Within a
    /// single contract, events are ordered by `(block_number, log_index)`;
    /// cross-contract ordering is unspecified.
    ///
    /// # Errors
    /// Returns an error only if the root-discovery query itself fails;
    /// per-child query failures are logged and counted, not propagated.
    #[instrument(skip(self), fields(from_block, to_block))]
    pub async fn scan(&self, from_block: u64, to_block: u64) -> crate::error::Result<ScanOutcome> {
        let extractor = EventExtractor::new(self.rpc);
        let mut outcome = ScanOutcome::default();

        for event_name in self.event_names_root {
            let discovery_events = extractor
                .query(self.root_contract_address, self.root_abi, event_name, from_block, to_block)
                .await?;

            for event in discovery_events.iter() {
                if let Some(child) = discovered_child_address(event)
                    && self.registry.add(child)
                {
                    info!(child = %child, "registry admitted new child contract");
                }
            }
            outcome.events.extend(discovery_events);
        }

        let children = self.registry.all();
        let mut tasks = Vec::with_capacity(children.len());
        for child in children {
            let semaphore = Arc::clone(&self.semaphore);
            let extractor = EventExtractor::new(self.rpc);
            let event_names = self.event_names_child;
            let abi = self.child_abi;
            tasks.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let mut child_events = Vec::new();
                let mut errors = 0u64;
                for event_name in event_names {
                    match extractor.query(child, abi, event_name, from_block, to_block).await {
                        Ok(events) => child_events.extend(events),
                        Err(e) => {
                            warn!(child = %child, event_name, error = %e, "child query failed, continuing");
                            errors += 1;
                        }
                    }
                }
                (child_events, errors)
            });
        }

        let results = futures::future::join_all(tasks).await;
        for (mut events, errors) in results {
            events.sort_by_key(|e| (e.block_number, e.log_index));
            outcome.events.extend(events);
            outcome.errors_count += errors;
        }

        Ok(outcome)
    }
}

/// Name of the discovery event's argument carrying the new child's address.
/// Factory ABIs in this system always name it `escrow`, even when the same
/// event also carries other address-typed args (`payer`, `payee`,
/// `arbiter`) that must not be mistaken for the child contract.
const CHILD_ADDRESS_ARG: &str = "escrow";

/// Pull the new child's address out of a discovery event's decoded args.
fn discovered_child_address(event: &DecodedEvent) -> Option<EthAddress> {
    event.args.get(CHILD_ADDRESS_ARG).and_then(|v| EthAddress::from_hex(v).ok())
}
