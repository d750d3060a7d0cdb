//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Chain identity, contracts, and polling cadence.
    pub relay: RelaySettings,
    /// RPC retry/backoff/rate-limit policy.
    pub rpc: RpcSettings,
    /// Message bus (publisher) configuration.
    pub publisher: PublisherSettings,
    /// Checkpoint/dedup store configuration.
    pub checkpoint_store: CheckpointStoreSettings,
    /// Contract registry file configuration.
    pub registry: RegistrySettings,
    /// Admin & health HTTP surface configuration.
    pub api: ApiSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Metrics configuration.
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `RELAYER__` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            .set_default("relay.chain_id", "1")?
            .set_default("relay.rpc_url", "http://localhost:8545")?
            .set_default("relay.root_contract_address", "0x0000000000000000000000000000000000000000")?
            .set_default("relay.root_abi", "[]")?
            .set_default("relay.child_abi", "[]")?
            .set_default("relay.event_names_root", vec!["Deployed".to_string()])?
            .set_default("relay.event_names_child", Vec::<String>::new())?
            .set_default("relay.start_block", 0)?
            .set_default("relay.poll_interval_seconds", 12)?
            .set_default("relay.batch_size", 5)?
            .set_default("relay.auto_fast_forward_threshold", 500)?
            .set_default("rpc.rpc_rate_limit_delay_ms", 100)?
            .set_default("rpc.rpc_max_retries", 5)?
            .set_default("rpc.rpc_backoff_factor", 2.0)?
            .set_default("rpc.rpc_max_backoff_secs", 60)?
            .set_default("rpc.max_concurrent_requests", 10)?
            .set_default("publisher.url", "tcp://localhost:8090")?
            .set_default("publisher.stream_name", "relayer")?
            .set_default("publisher.topic_name", "events")?
            .set_default("publisher.username", "iggy")?
            .set_default("publisher.password", "iggy")?
            .set_default("publisher.max_retries", 3)?
            .set_default("publisher.publish_timeout_secs", 10)?
            .set_default("checkpoint_store.checkpoint_store_type", "embedded")?
            .set_default("checkpoint_store.checkpoint_store_url", "relayer_checkpoints.db")?
            .set_default("checkpoint_store.cleanup_interval_hours", 24)?
            .set_default("checkpoint_store.retention_days", 7)?
            .set_default("registry.file_path", "registry.json")?
            .set_default("api.host", "0.0.0.0")?
            .set_default("api.port", 8080)?
            .set_default("api.admin_secret", Option::<String>::None)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("logging.file_path", Option::<String>::None)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.host", "0.0.0.0")?
            .set_default("metrics.port", 9090)?
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            .add_source(
                Environment::with_prefix("RELAYER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.relay.chain_id.is_empty() {
            errors.push("relay.chain_id cannot be empty".into());
        }
        if self.relay.rpc_url.is_empty() {
            errors.push("relay.rpc_url cannot be empty".into());
        }
        if self.relay.batch_size == 0 {
            errors.push("relay.batch_size must be non-zero".into());
        }
        if serde_json::from_str::<serde_json::Value>(&self.relay.root_abi).is_err() {
            errors.push("relay.root_abi is not valid JSON".into());
        }
        if serde_json::from_str::<serde_json::Value>(&self.relay.child_abi).is_err() {
            errors.push("relay.child_abi is not valid JSON".into());
        }

        if self.rpc.max_concurrent_requests == 0 {
            errors.push("rpc.max_concurrent_requests must be non-zero".into());
        }
        if self.rpc.rpc_max_retries == 0 {
            errors.push("rpc.rpc_max_retries must be non-zero".into());
        }

        if self.publisher.url.is_empty() {
            errors.push("publisher.url cannot be empty".into());
        }

        match self.checkpoint_store.checkpoint_store_type.as_str() {
            "embedded" | "networked" => {}
            other => errors.push(format!(
                "checkpoint_store.checkpoint_store_type must be 'embedded' or 'networked', got '{other}'"
            )),
        }
        if self.checkpoint_store.checkpoint_store_type == "networked"
            && self.checkpoint_store.checkpoint_store_url.is_empty()
        {
            errors.push("checkpoint_store.checkpoint_store_url is required for the networked backend".into());
        }

        if self.api.port == 0 {
            errors.push("api.port must be non-zero".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Chain identity, contracts, ABIs, and scan cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// Identifier baked into every published message and checkpoint key.
    pub chain_id: String,
    /// Upstream EVM RPC endpoint. A `wss://` scheme selects the filter-based path.
    pub rpc_url: String,
    /// Factory/registry contract scanned for discovery events.
    pub root_contract_address: String,
    /// ABI (JSON string or file path, resolved at load time) for the root contract.
    pub root_abi: String,
    /// ABI (JSON string or file path, resolved at load time) for child contracts.
    pub child_abi: String,
    /// Event names to extract from the root contract.
    pub event_names_root: Vec<String>,
    /// Event names to extract from child contracts.
    pub event_names_child: Vec<String>,
    /// Starting block, used only when no checkpoint exists yet.
    pub start_block: u64,
    /// Base sleep between scan cycles.
    pub poll_interval_seconds: u64,
    /// Maximum blocks per sub-batch log query.
    pub batch_size: u64,
    /// Blocks-behind threshold that triggers catch-up (no inter-batch sleep).
    pub auto_fast_forward_threshold: u64,
}

impl RelaySettings {
    /// The base poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// RPC retry/backoff/rate-limit policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// Pre-call pacer, in milliseconds.
    pub rpc_rate_limit_delay_ms: u64,
    /// Maximum RPC retry attempts.
    pub rpc_max_retries: u32,
    /// Exponential backoff base.
    pub rpc_backoff_factor: f64,
    /// Cap on backoff delay, in seconds.
    pub rpc_max_backoff_secs: u64,
    /// Fan-out semaphore capacity.
    pub max_concurrent_requests: usize,
}

impl RpcSettings {
    /// The pre-call pacer as a `Duration`.
    #[must_use]
    pub const fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rpc_rate_limit_delay_ms)
    }

    /// The backoff cap as a `Duration`.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.rpc_max_backoff_secs)
    }
}

/// Message bus (publisher) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherSettings {
    /// Iggy server URL.
    pub url: String,
    /// Stream name events are published under.
    pub stream_name: String,
    /// Single topic name events are published to.
    pub topic_name: String,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Publish retry attempts (distinct from `rpc_max_retries`).
    pub max_retries: u32,
    /// Per-attempt publish timeout, in seconds.
    pub publish_timeout_secs: u64,
}

impl PublisherSettings {
    /// The per-attempt publish timeout as a `Duration`.
    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

/// Checkpoint/dedup store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointStoreSettings {
    /// `embedded` (SQLite) or `networked` (`PostgreSQL`).
    pub checkpoint_store_type: String,
    /// Path (embedded) or connection string (networked).
    pub checkpoint_store_url: String,
    /// Cleanup task cadence, in hours.
    pub cleanup_interval_hours: u64,
    /// Age, in days, beyond which processed-event records are garbage-collected.
    pub retention_days: i64,
}

impl CheckpointStoreSettings {
    /// Whether the embedded (SQLite) backend is selected.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.checkpoint_store_type == "embedded"
    }

    /// The cleanup cadence as a `Duration`.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours * 3600)
    }
}

/// Contract registry file configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    /// Path to the registry's persisted JSON file.
    pub file_path: String,
}

/// Admin & health HTTP surface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Shared secret required by the rewind endpoint, if set.
    pub admin_secret: Option<String>,
}

impl ApiSettings {
    /// The socket address string to bind the HTTP server on.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
    /// Optional file path for log output.
    pub file_path: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// Whether Prometheus metrics export is enabled.
    pub enabled: bool,
    /// Host to bind the metrics server to.
    pub host: String,
    /// Port for the metrics server.
    pub port: u16,
}

impl MetricsSettings {
    /// The metrics server socket address string.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn create_valid_settings() -> Settings {
        Settings {
            relay: RelaySettings {
                chain_id: "1".into(),
                rpc_url: "http://localhost:8545".into(),
                root_contract_address: "0x0000000000000000000000000000000000000000".into(),
                root_abi: "[]".into(),
                child_abi: "[]".into(),
                event_names_root: vec!["Deployed".into()],
                event_names_child: vec!["Transfer".into()],
                start_block: 0,
                poll_interval_seconds: 12,
                batch_size: 5,
                auto_fast_forward_threshold: 500,
            },
            rpc: RpcSettings {
                rpc_rate_limit_delay_ms: 100,
                rpc_max_retries: 5,
                rpc_backoff_factor: 2.0,
                rpc_max_backoff_secs: 60,
                max_concurrent_requests: 10,
            },
            publisher: PublisherSettings {
                url: "tcp://localhost:8090".into(),
                stream_name: "relayer".into(),
                topic_name: "events".into(),
                username: "iggy".into(),
                password: "iggy".into(),
                max_retries: 3,
                publish_timeout_secs: 10,
            },
            checkpoint_store: CheckpointStoreSettings {
                checkpoint_store_type: "embedded".into(),
                checkpoint_store_url: "relayer_checkpoints.db".into(),
                cleanup_interval_hours: 24,
                retention_days: 7,
            },
            registry: RegistrySettings {
                file_path: "registry.json".into(),
            },
            api: ApiSettings {
                host: "0.0.0.0".into(),
                port: 8080,
                admin_secret: None,
            },
            logging: LoggingSettings {
                level: "info".into(),
                format: "json".into(),
                file_path: None,
            },
            metrics: MetricsSettings {
                enabled: true,
                host: "0.0.0.0".into(),
                port: 9090,
            },
        }
    }

    #[test]
    fn rpc_durations() {
        let rpc = RpcSettings {
            rpc_rate_limit_delay_ms: 100,
            rpc_max_retries: 5,
            rpc_backoff_factor: 2.0,
            rpc_max_backoff_secs: 60,
            max_concurrent_requests: 10,
        };
        assert_eq!(rpc.rate_limit_delay(), Duration::from_millis(100));
        assert_eq!(rpc.max_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn api_socket_addr() {
        let api = ApiSettings {
            host: "127.0.0.1".into(),
            port: 8080,
            admin_secret: None,
        };
        assert_eq!(api.socket_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn validation_passes_for_defaults() {
        let settings = create_valid_settings();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validation_catches_zero_batch_size() {
        let mut settings = create_valid_settings();
        settings.relay.batch_size = 0;
        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("batch_size")));
    }

    #[test]
    fn validation_requires_url_for_networked_store() {
        let mut settings = create_valid_settings();
        settings.checkpoint_store.checkpoint_store_type = "networked".into();
        settings.checkpoint_store.checkpoint_store_url = String::new();
        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("checkpoint_store_url")));
    }

    #[test]
    fn validation_rejects_invalid_abi_json() {
        let mut settings = create_valid_settings();
        settings.relay.root_abi = "not json".into();
        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("root_abi")));
    }
}
