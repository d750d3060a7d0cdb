//! Event extractor (C4): resolves an event's topic0 from a contract's ABI,
//! delegates raw log retrieval to the RPC client, and decodes each log.

use alloy::primitives::Address;
use tracing::instrument;

use crate::abi::LoadedAbi;
use crate::error::Result;
use crate::rpc::RpcClient;
use crate::types::entities::DecodedEvent;
use crate::types::primitives::EthAddress;

/// Extracts decoded events for a single contract/event pair over a block range.
#[derive(Debug)]
pub struct EventExtractor<'a> {
    rpc: &'a RpcClient,
}

impl<'a> EventExtractor<'a> {
    /// Build an extractor over the given RPC client.
    #[must_use]
    pub const fn new(rpc: &'a RpcClient) -> Self {
        Self { rpc }
    }

    /// Query and decode `event_name` emitted by `contract_address` in
    /// `[from_block, to_block]`.
    ///
    /// A missing event name in `abi` returns an empty list and logs a
    /// warning rather than failing — a common consequence of minor ABI
    /// drift in an actively developed contract fleet.
    ///
    /// # Errors
    /// Propagates RPC errors from the underlying client.
    #[instrument(skip(self, abi), fields(contract = %contract_address, event_name, from_block, to_block))]
    pub async fn query(
        &self,
        contract_address: EthAddress,
        abi: &LoadedAbi,
        event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DecodedEvent>> {
        let Some(topic0) = abi.topic0(event_name) else {
            // abi.decode_log already warns on the miss; nothing more to do.
            return Ok(Vec::new());
        };

        let address: Address = contract_address.into();
        let logs = self
            .rpc
            .get_logs(address, topic0, from_block, to_block)
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let Some(args) = abi.decode_log(event_name, log) else {
                continue;
            };
            let Some(block_number) = log.block_number else {
                continue;
            };
            let Some(tx_hash) = log.transaction_hash else {
                continue;
            };
            let log_index = log.log_index.unwrap_or(0);

            events.push(DecodedEvent {
                contract_address,
                event_name: event_name.to_string(),
                block_number,
                transaction_hash: format!("{tx_hash:#x}"),
                log_index,
                args,
                timestamp: chrono::Utc::now(),
            });
        }

        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }
}
