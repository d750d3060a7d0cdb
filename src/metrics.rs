//! Prometheus export of the process-local [`Metrics`] counters.
//!
//! The admin surface (C8) exposes the same numbers as JSON on `/healthz`;
//! this module mirrors them as Prometheus gauges/counters for scraping,
//! on top of the same `Metrics` handle.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::MetricsSettings;
use crate::error::{AppError, Result};
use crate::types::entities::{Metrics as RelayMetrics, MetricsSnapshot};

/// Install the global Prometheus recorder and bind its scrape listener.
///
/// # Errors
/// Returns an error if the listener address is invalid or the exporter
/// cannot bind to it.
pub fn install_exporter(settings: &MetricsSettings) -> Result<()> {
    let addr: SocketAddr = settings
        .socket_addr()
        .parse()
        .map_err(|e| AppError::Initialization(format!("invalid metrics address: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Initialization(format!("failed to install Prometheus exporter: {e}")))?;

    describe_gauge!("relayer_is_running", "1 if the relay loop is mid-cycle, else 0");
    describe_gauge!("relayer_last_processed_block", "Highest block number the checkpoint has advanced to");
    describe_gauge!("relayer_uptime_seconds", "Seconds since the relay loop started");
    describe_counter!("relayer_events_processed_total", "Events successfully published and marked processed");
    describe_counter!("relayer_events_published_total", "Events successfully published to the bus");
    describe_counter!("relayer_errors_total", "RPC, store, and publish errors encountered");

    info!(addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Push one snapshot's worth of values into the installed recorder.
///
/// Counters are monotonic process totals, so this sets them to the
/// snapshot's absolute value rather than incrementing — safe because
/// [`MetricsSnapshot`] already holds cumulative counts.
fn record_snapshot(snapshot: &MetricsSnapshot) {
    gauge!("relayer_is_running").set(f64::from(u8::from(snapshot.is_running)));
    #[allow(clippy::cast_precision_loss)]
    gauge!("relayer_last_processed_block").set(snapshot.last_processed_block as f64);
    #[allow(clippy::cast_precision_loss)]
    gauge!("relayer_uptime_seconds").set(snapshot.uptime_secs as f64);
    counter!("relayer_events_processed_total").absolute(snapshot.total_events_processed);
    counter!("relayer_events_published_total").absolute(snapshot.total_events_published);
    counter!("relayer_errors_total").absolute(snapshot.errors_count);
}

/// Periodically mirror the relay loop's counters into the Prometheus
/// recorder until cancelled.
#[instrument(skip(metrics, shutdown))]
pub async fn run_recorder(metrics: RelayMetrics, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => record_snapshot(&metrics.snapshot()),
            () = shutdown.cancelled() => {
                info!("metrics recorder stopping on shutdown signal");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::entities::Metrics as RelayMetrics;

    #[test]
    fn record_snapshot_does_not_panic_without_installed_recorder() {
        let metrics = RelayMetrics::new();
        metrics.set_running(true);
        metrics.record_event_processed();
        record_snapshot(&metrics.snapshot());
    }
}
