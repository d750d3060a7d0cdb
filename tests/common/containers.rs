//! Disposable PostgreSQL container for the networked checkpoint-store backend.
//!
//! This relayer's `PostgresCheckpointStore` targets plain PostgreSQL (no
//! hypertable or other TimescaleDB-specific feature), so integration tests
//! run against the stock `postgres` image via `testcontainers-modules`
//! rather than a hand-rolled `Image` impl.

#![allow(clippy::expect_used)]

use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

/// Start a fresh `postgres:latest` container and return it alongside its
/// connection string. The container is torn down when the returned handle
/// is dropped.
pub async fn start_postgres() -> (ContainerAsync<Postgres>, String) {
    let container = Postgres::default()
        .start()
        .await
        .expect("failed to start postgres container");

    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");

    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");
    (container, url)
}
