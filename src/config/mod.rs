//! Configuration loading and validation for the event relayer.
//!
//! Configuration is loaded from multiple sources in order of precedence:
//! 1. Environment variables (highest)
//! 2. Environment-specific file (e.g., `development.toml`)
//! 3. Default file (`default.toml`)
//!
//! # Example
//!
//! ```ignore
//! use evm_event_relayer::config::Settings;
//!
//! let settings = Settings::load("development")?;
//! println!("RPC URL: {}", settings.relay.rpc_url);
//! ```

mod settings;

pub use settings::{
    ApiSettings, CheckpointStoreSettings, LoggingSettings, MetricsSettings, PublisherSettings,
    RegistrySettings, RelaySettings, RpcSettings, Settings,
};
