//! EVM event relayer CLI.
//!
//! Subcommands:
//! - `run` — start the relay loop, cleanup task, metrics exporter, and admin/health server
//! - `migrate` — apply checkpoint store migrations and exit
//! - `version` — print the relayer version

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use evm_event_relayer::abi::LoadedAbi;
use evm_event_relayer::api::{self, ApiState};
use evm_event_relayer::config::{LoggingSettings, Settings};
use evm_event_relayer::error::{AppError, Result};
use evm_event_relayer::indexer::{RelayLoop, cleanup_task};
use evm_event_relayer::metrics as relay_metrics;
use evm_event_relayer::ports::{CheckpointStore, EventPublisher};
use evm_event_relayer::registry::ContractRegistry;
use evm_event_relayer::rpc::{RetryPolicy, RpcClient};
use evm_event_relayer::store::{PostgresCheckpointStore, SqliteCheckpointStore};
use evm_event_relayer::streaming::IggyPublisher;
use evm_event_relayer::types::entities::Metrics;

/// EVM event relayer.
#[derive(Parser, Debug)]
#[command(name = "evm-event-relayer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Environment name, selects `config/{env}.toml` over `config/default.toml`.
    #[arg(long, env = "RELAYER_ENV", default_value = "production")]
    env: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay loop, cleanup task, metrics exporter, and admin/health server.
    Run {
        /// Override the configured starting block for this run.
        #[arg(long)]
        from_block: Option<u64>,
    },
    /// Apply checkpoint store migrations and exit.
    Migrate,
    /// Print the relayer version.
    Version,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("evm-event-relayer {}", evm_event_relayer::VERSION);
        return Ok(());
    }

    let mut settings = Settings::load(&cli.env).map_err(|e| AppError::Config(e.to_string()))?;
    settings
        .validate()
        .map_err(|errors| AppError::Config(errors.join("; ")))?;

    let _log_guard = init_logging(&settings.logging);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| AppError::Initialization(format!("failed to start async runtime: {e}")))?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Migrate => run_migrate(&settings).await,
            Commands::Run { from_block } => {
                if let Some(from_block) = from_block {
                    settings.relay.start_block = from_block;
                }
                run_relayer(settings).await
            }
            Commands::Version => unreachable!("handled before the runtime was built"),
        }
    })
}

/// Initialize the tracing subscriber per [`LoggingSettings`]. Returns the
/// non-blocking writer's guard, which must be held for the process lifetime.
fn init_logging(settings: &LoggingSettings) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = tracing_subscriber::EnvFilter::try_new(&settings.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (writer, guard) = match &settings.file_path {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map_or_else(|| "relayer.log".into(), |n| n.to_string_lossy().into_owned());
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);
    if settings.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    guard
}

/// `sqlite::memory:` and `sqlite://...` URLs pass through unchanged; a bare
/// file path is turned into a `sqlite://` URL that creates the file if missing.
fn sqlite_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{path}?mode=rwc")
    }
}

async fn run_migrate(settings: &Settings) -> Result<()> {
    if settings.checkpoint_store.is_embedded() {
        let pool = SqlitePoolOptions::new()
            .connect(&sqlite_url(&settings.checkpoint_store.checkpoint_store_url))
            .await
            .map_err(|e| AppError::Initialization(format!("failed to open sqlite checkpoint store: {e}")))?;
        SqliteCheckpointStore::new(pool).run_migrations().await?;
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&settings.checkpoint_store.checkpoint_store_url)
            .await
            .map_err(|e| AppError::Initialization(format!("failed to connect to postgres checkpoint store: {e}")))?;
        PostgresCheckpointStore::new(pool).run_migrations().await?;
    }
    info!("migrations applied");
    Ok(())
}

async fn run_relayer(settings: Settings) -> Result<()> {
    info!(
        version = evm_event_relayer::VERSION,
        chain_id = %settings.relay.chain_id,
        "starting relayer"
    );

    let retry_policy = RetryPolicy {
        base_delay: Duration::from_millis(settings.rpc.rpc_rate_limit_delay_ms),
        backoff_factor: settings.rpc.rpc_backoff_factor,
        max_backoff: settings.rpc.max_backoff(),
        max_retries: settings.rpc.rpc_max_retries,
    };
    let rpc = RpcClient::connect(&settings.relay.rpc_url, settings.rpc.rate_limit_delay(), retry_policy).await?;

    let root_abi = LoadedAbi::load(&settings.relay.root_abi)?;
    let child_abi = LoadedAbi::load(&settings.relay.child_abi)?;

    let registry = Arc::new(ContractRegistry::new(
        &settings.registry.file_path,
        settings.relay.chain_id.clone(),
    ));
    registry.load()?;
    info!(count = registry.count(), "contract registry loaded");

    let checkpoint_store: Arc<dyn CheckpointStore> = if settings.checkpoint_store.is_embedded() {
        let pool = SqlitePoolOptions::new()
            .connect(&sqlite_url(&settings.checkpoint_store.checkpoint_store_url))
            .await
            .map_err(|e| AppError::Initialization(format!("failed to open sqlite checkpoint store: {e}")))?;
        let store = SqliteCheckpointStore::new(pool);
        store.run_migrations().await?;
        Arc::new(store)
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&settings.checkpoint_store.checkpoint_store_url)
            .await
            .map_err(|e| AppError::Initialization(format!("failed to connect to postgres checkpoint store: {e}")))?;
        let store = PostgresCheckpointStore::new(pool);
        store.run_migrations().await?;
        Arc::new(store)
    };

    let publisher: Arc<dyn EventPublisher> = Arc::new(IggyPublisher::new(&settings.publisher)?);

    let metrics = Metrics::new();
    let shutdown = CancellationToken::new();
    let metrics_enabled = settings.metrics.enabled;

    let relay_loop = RelayLoop::new(
        rpc.clone(),
        Arc::clone(&checkpoint_store),
        Arc::clone(&publisher),
        Arc::clone(&registry),
        root_abi,
        child_abi,
        settings.relay.clone(),
        settings.rpc.max_concurrent_requests,
        metrics.clone(),
        shutdown.clone(),
    );
    let relay_state = relay_loop.state_handle();

    if metrics_enabled {
        relay_metrics::install_exporter(&settings.metrics)?;
    }

    let api_state = Arc::new(ApiState {
        relay_state,
        metrics: metrics.clone(),
        checkpoint_store: Arc::clone(&checkpoint_store),
        rpc: rpc.clone(),
        relay_settings: settings.relay.clone(),
        api_settings: settings.api.clone(),
    });
    let api_addr: SocketAddr = settings
        .api
        .socket_addr()
        .parse()
        .map_err(|e| AppError::Initialization(format!("invalid admin/health address: {e}")))?;
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .map_err(|e| AppError::Initialization(format!("failed to bind admin/health listener: {e}")))?;
    let api_router = api::router(api_state);

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            ctrl_c_shutdown.cancel();
        }
    });

    let cleanup_store = Arc::clone(&checkpoint_store);
    let cleanup_interval = settings.checkpoint_store.cleanup_interval();
    let retention_days = settings.checkpoint_store.retention_days;
    let cleanup_shutdown = shutdown.clone();
    let cleanup_handle =
        tokio::spawn(async move { cleanup_task(cleanup_store, cleanup_interval, retention_days, cleanup_shutdown).await });

    let metrics_recorder_metrics = metrics.clone();
    let metrics_shutdown = shutdown.clone();
    let metrics_handle = tokio::spawn(async move {
        if metrics_enabled {
            relay_metrics::run_recorder(metrics_recorder_metrics, Duration::from_secs(15), metrics_shutdown).await;
        }
    });

    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        let result = axum::serve(api_listener, api_router)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "admin/health server exited with error");
        }
    });

    let relay_result = relay_loop.run().await;

    shutdown.cancel();
    let _ = cleanup_handle.await;
    let _ = metrics_handle.await;
    let _ = api_handle.await;

    relay_result
}
