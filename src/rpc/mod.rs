//! RPC client adapter (C1): rate-limited, retrying access to an EVM node.

mod client;

pub use client::{RetryPolicy, RpcClient, is_rate_limit_error};
