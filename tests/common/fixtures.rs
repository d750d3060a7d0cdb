//! Test fixtures for integration tests: a disposable checkpoint store
//! (SQLite in-memory or a real PostgreSQL container) plus builders for the
//! relayer's entities.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use sqlx::sqlite::SqlitePoolOptions;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

use evm_event_relayer::store::{PostgresCheckpointStore, SqliteCheckpointStore};

use super::containers::start_postgres;

/// A `PostgresCheckpointStore` backed by a fresh container, kept alive for
/// the lifetime of this struct.
pub struct TestDb {
    /// The checkpoint store under test.
    pub store: PostgresCheckpointStore,
    /// The container (kept alive for the duration of the test).
    _container: ContainerAsync<Postgres>,
}

impl TestDb {
    /// Start a fresh `PostgreSQL` container, connect, and run migrations.
    ///
    /// # Panics
    /// Panics if container startup, connection, or migrations fail.
    pub async fn new() -> Self {
        let (container, url) = start_postgres().await;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("failed to connect to postgres container");

        let store = PostgresCheckpointStore::new(pool);
        store.run_migrations().await.expect("failed to run postgres migrations");

        Self { store, _container: container }
    }
}

/// A `SqliteCheckpointStore` backed by an in-memory database. No container,
/// cheap enough to spin up per test.
pub async fn sqlite_store() -> SqliteCheckpointStore {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool");
    let store = SqliteCheckpointStore::new(pool);
    store.run_migrations().await.expect("failed to run sqlite migrations");
    store
}

/// Builders for the relayer's entities, used across the store and
/// full-flow integration tests.
pub mod entities {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use evm_event_relayer::types::entities::{Checkpoint, DecodedEvent, ProcessedEvent};
    use evm_event_relayer::types::primitives::EthAddress;

    /// A deterministic, non-zero test address. `seed` varies the last byte
    /// so callers can mint distinct addresses cheaply.
    #[must_use]
    pub fn address(seed: u8) -> EthAddress {
        let mut bytes = [0x11u8; 20];
        bytes[19] = seed;
        EthAddress::new(bytes)
    }

    /// A fresh checkpoint at `last_processed_block`.
    #[must_use]
    pub fn checkpoint(chain_id: &str, contract: EthAddress, last_processed_block: u64) -> Checkpoint {
        Checkpoint::new(chain_id, contract, last_processed_block)
    }

    /// A decoded event with the given block/log-index/args, ready to be
    /// fed through the publish-then-mark path or compared against one that
    /// came out of it.
    #[must_use]
    pub fn decoded_event(
        contract: EthAddress,
        event_name: &str,
        block_number: u64,
        tx_hash: &str,
        log_index: u64,
        args: &[(&str, &str)],
    ) -> DecodedEvent {
        DecodedEvent {
            contract_address: contract,
            event_name: event_name.to_string(),
            block_number,
            transaction_hash: tx_hash.to_string(),
            log_index,
            args: args.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect::<BTreeMap<_, _>>(),
            timestamp: Utc::now(),
        }
    }

    /// A `ProcessedEvent` derived from a `DecodedEvent`, as the relay loop
    /// would build it before calling `mark_event_processed`.
    #[must_use]
    pub fn processed_event(chain_id: &str, event: &DecodedEvent) -> ProcessedEvent {
        ProcessedEvent {
            event_id: event.event_id(chain_id),
            chain_id: chain_id.to_string(),
            contract_address: event.contract_address,
            block_number: event.block_number,
            transaction_hash: event.transaction_hash.clone(),
            log_index: event.log_index,
            event_name: event.event_name.clone(),
            processed_at: Utc::now(),
            published: true,
            metadata: serde_json::json!({ "args": event.args }),
        }
    }
}
