//! Rate-limited, retrying JSON-RPC client for EVM log queries (C1).
//!
//! Every call is preceded by a small pacing delay to keep provider
//! rate-limit heuristics cool, and rate-limit errors are retried with
//! exponential backoff. All other errors propagate immediately — this
//! layer only absorbs the one failure class it understands.

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::{RpcError, TransportErrorKind};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::error::{InfraError, Result};

/// Substrings (case-folded) that identify a rate-limit error in a provider's
/// message. Anything else is treated as non-retryable at this layer.
const RATE_LIMIT_INDICATORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "quota exceeded",
    "throttled",
    "request limit",
    "rate exceeded",
    "free tier",
    "block range",
    "eth_newfilter",
];

/// Retry policy for rate-limited RPC calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
    /// Ceiling on the computed delay.
    pub max_backoff: Duration,
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the nth retry (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(secs).min(self.max_backoff)
    }
}

/// Returns true if `message` (any case) looks like a provider rate-limit
/// complaint rather than a genuine protocol or network failure.
#[must_use]
pub fn is_rate_limit_error(message: &str) -> bool {
    let folded = message.to_lowercase();
    RATE_LIMIT_INDICATORS.iter().any(|needle| folded.contains(needle))
}

/// Rate-limited, retrying RPC client wrapping an Alloy provider.
#[derive(Debug, Clone)]
pub struct RpcClient {
    provider: DynProvider,
    pacer_delay: Duration,
    retry_policy: RetryPolicy,
    uses_filter_sequence: bool,
}

impl RpcClient {
    /// Connect to `rpc_url`. A `ws://`/`wss://` scheme selects the
    /// filter-create/fetch-all/uninstall query path; anything else uses a
    /// single bounded `eth_getLogs` call.
    ///
    /// # Errors
    /// Returns an error if the endpoint cannot be reached.
    pub async fn connect(rpc_url: &str, pacer_delay: Duration, retry_policy: RetryPolicy) -> Result<Self> {
        let uses_filter_sequence = rpc_url.starts_with("ws://") || rpc_url.starts_with("wss://");

        let provider = if uses_filter_sequence {
            ProviderBuilder::new()
                .connect_ws(WsConnect::new(rpc_url))
                .await
                .map_err(|e| InfraError::Rpc { transient: false, source: Box::new(e) })?
                .erased()
        } else {
            let url = rpc_url.parse().map_err(|e| InfraError::Rpc {
                transient: false,
                source: Box::new(std::io::Error::other(format!("{e}"))),
            })?;
            ProviderBuilder::new().connect_http(url).erased()
        };

        Ok(Self {
            provider,
            pacer_delay,
            retry_policy,
            uses_filter_sequence,
        })
    }

    /// Wrap an already-constructed provider (used by tests to inject a mock transport).
    #[must_use]
    pub fn with_provider(provider: DynProvider, pacer_delay: Duration, retry_policy: RetryPolicy) -> Self {
        Self {
            provider,
            pacer_delay,
            retry_policy,
            uses_filter_sequence: false,
        }
    }

    /// Latest block number known to the node, with retry on rate-limit errors.
    ///
    /// # Errors
    /// Returns `InfraError::RateLimitExhausted` if retries are exhausted, or
    /// propagates any other error immediately.
    #[instrument(skip(self))]
    pub async fn latest_block(&self) -> Result<u64> {
        self.with_retry(|| async { self.provider.get_block_number().await })
            .await
    }

    /// Fetch logs for `contract` matching `event_signature` (a keccak topic0
    /// hex string) in `[from_block, to_block]`.
    ///
    /// # Errors
    /// Returns `InfraError::RateLimitExhausted` if retries are exhausted, or
    /// propagates any other error immediately.
    #[instrument(skip(self), fields(contract = %contract, from_block, to_block))]
    pub async fn get_logs(
        &self,
        contract: Address,
        event_signature: alloy::primitives::B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(event_signature)
            .from_block(from_block)
            .to_block(to_block);

        if self.uses_filter_sequence {
            self.get_logs_via_filter(&filter).await
        } else {
            self.with_retry(|| async { self.provider.get_logs(&filter).await })
                .await
        }
    }

    async fn get_logs_via_filter(&self, filter: &Filter) -> Result<Vec<Log>> {
        let filter_id = self
            .with_retry(|| async { self.provider.new_filter(filter).await })
            .await?;

        let logs = self
            .with_retry(|| async { self.provider.get_filter_logs(filter_id).await })
            .await;

        // Uninstall is best-effort: a failure here must not mask the query result.
        if let Err(e) = self.provider.uninstall_filter(filter_id).await {
            warn!(error = %e, "failed to uninstall filter, leaking on node until it expires");
        }

        logs
    }

    async fn with_retry<F, Fut, T>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, RpcError<TransportErrorKind>>>,
    {
        sleep(self.pacer_delay).await;

        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_rate_limit_error(&e.to_string()) => {
                    if attempt >= self.retry_policy.max_retries {
                        return Err(InfraError::RateLimitExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        }
                        .into());
                    }
                    let delay = self.retry_policy.delay_for(attempt);
                    debug!(attempt, ?delay, "rate limited, backing off");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(InfraError::Rpc {
                        transient: false,
                        source: Box::new(e),
                    }
                    .into());
                }
            }
        }
    }
}
