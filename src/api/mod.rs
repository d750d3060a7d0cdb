//! Admin & health HTTP surface (C8).
//!
//! Two endpoints: `GET /healthz` for process/chain-lag status, and
//! `POST /admin/rewind` — the only operator-visible way to reprocess
//! history, gated by an optional constant-time-compared shared secret.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::{ApiSettings, RelaySettings};
use crate::error::{ApiError, DomainError};
use crate::indexer::RelayStateHandle;
use crate::ports::CheckpointStore;
use crate::rpc::RpcClient;
use crate::types::entities::{Checkpoint, Metrics};
use crate::types::primitives::EthAddress;

/// Shared state reachable from every handler.
pub struct ApiState {
    /// Live relay loop state (`Idle`/`Running`/`Sleeping`/`ShuttingDown`).
    pub relay_state: RelayStateHandle,
    /// Process-local counters.
    pub metrics: Metrics,
    /// Checkpoint/dedup store, for reading the current checkpoint and
    /// writing an admin rewind.
    pub checkpoint_store: Arc<dyn CheckpointStore>,
    /// RPC client, for reading the current chain tip.
    pub rpc: RpcClient,
    /// Chain identity and the root contract address being tracked.
    pub relay_settings: RelaySettings,
    /// Host/port/admin-secret for this surface.
    pub api_settings: ApiSettings,
}

/// Build the admin & health router over the given state.
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/admin/rewind", post(rewind))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    is_running: bool,
    last_processed_block: u64,
    current_block: u64,
    blocks_behind: u64,
    events_processed: u64,
    errors_count: u64,
    chain_id: String,
    root_contract: String,
}

async fn health(State(state): State<Arc<ApiState>>) -> Result<impl IntoResponse, ApiError> {
    let root_address = EthAddress::from_hex(&state.relay_settings.root_contract_address)
        .map_err(|e| ApiError::App(e.into()))?;

    let checkpoint = state
        .checkpoint_store
        .get_checkpoint(&state.relay_settings.chain_id, root_address)
        .await
        .map_err(ApiError::App)?;
    let last_processed_block = checkpoint.map_or(0, |cp| cp.last_processed_block);

    let current_block = state.rpc.latest_block().await.map_err(ApiError::App)?;
    let snapshot = state.metrics.snapshot();

    Ok(Json(HealthResponse {
        status: if snapshot.is_running { "running" } else { "idle" },
        is_running: snapshot.is_running,
        last_processed_block,
        current_block,
        blocks_behind: current_block.saturating_sub(last_processed_block),
        events_processed: snapshot.total_events_processed,
        errors_count: snapshot.errors_count,
        chain_id: state.relay_settings.chain_id.clone(),
        root_contract: state.relay_settings.root_contract_address.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct RewindRequest {
    start_block: u64,
    admin_secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct RewindResponse {
    ok: bool,
    start_block: u64,
}

async fn rewind(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RewindRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state.api_settings, request.admin_secret.as_deref())?;

    let root_address = EthAddress::from_hex(&state.relay_settings.root_contract_address)
        .map_err(|e| ApiError::App(e.into()))?;

    let latest = state.rpc.latest_block().await.map_err(ApiError::App)?;
    if request.start_block > latest {
        return Err(ApiError::App(
            DomainError::RewindRejected {
                reason: format!("start_block {} is beyond the current chain tip {latest}", request.start_block),
            }
            .into(),
        ));
    }

    warn!(
        start_block = request.start_block,
        chain_id = %state.relay_settings.chain_id,
        "admin rewind requested"
    );

    let checkpoint = Checkpoint::new(&state.relay_settings.chain_id, root_address, request.start_block);
    state
        .checkpoint_store
        .save_checkpoint(&checkpoint)
        .await
        .map_err(ApiError::App)?;

    Ok((
        StatusCode::OK,
        Json(RewindResponse { ok: true, start_block: request.start_block }),
    ))
}

/// Constant-time secret check. A request with no configured secret is
/// always authorized; a configured secret requires an exact match.
fn authorize(settings: &ApiSettings, provided: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = settings.admin_secret.as_deref() else {
        return Ok(());
    };
    let provided = provided.unwrap_or_default();
    if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_allows_when_no_secret_configured() {
        let settings = ApiSettings { host: "0.0.0.0".into(), port: 8080, admin_secret: None };
        assert!(authorize(&settings, None).is_ok());
    }

    #[test]
    fn authorize_rejects_missing_secret() {
        let settings = ApiSettings { host: "0.0.0.0".into(), port: 8080, admin_secret: Some("s3cr3t".into()) };
        assert!(authorize(&settings, None).is_err());
    }

    #[test]
    fn authorize_rejects_wrong_secret() {
        let settings = ApiSettings { host: "0.0.0.0".into(), port: 8080, admin_secret: Some("s3cr3t".into()) };
        assert!(authorize(&settings, Some("wrong")).is_err());
    }

    #[test]
    fn authorize_accepts_matching_secret() {
        let settings = ApiSettings { host: "0.0.0.0".into(), port: 8080, admin_secret: Some("s3cr3t".into()) };
        assert!(authorize(&settings, Some("s3cr3t")).is_ok());
    }
}
