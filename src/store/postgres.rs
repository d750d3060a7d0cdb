//! PostgreSQL implementation of the checkpoint store port, using SQLx.
//!
//! This is the networked backend: a connection pool shared across tasks,
//! migrations run once at startup, and the dedup gate implemented as an
//! atomic `INSERT ... ON CONFLICT DO NOTHING`.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, postgres::PgPool};
use tracing::instrument;

use crate::error::{InfraError, Result};
use crate::ports::CheckpointStore;
use crate::types::entities::{Checkpoint, ProcessedEvent};
use crate::types::primitives::EthAddress;

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES CHECKPOINT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Networked checkpoint store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Create a new store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres")
            .run(&self.pool)
            .await
            .map_err(|e| InfraError::Store(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct CheckpointRow {
    chain_id: String,
    contract_address: String,
    last_processed_block: i64,
    last_processed_timestamp: DateTime<Utc>,
    total_events_processed: i64,
    metadata: serde_json::Value,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = InfraError;

    fn try_from(row: CheckpointRow) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            chain_id: row.chain_id,
            contract_address: EthAddress::from_hex(&row.contract_address)
                .map_err(|e| InfraError::Store(sqlx::Error::Decode(Box::new(e))))?,
            last_processed_block: row.last_processed_block as u64,
            last_processed_at: row.last_processed_timestamp,
            total_events_processed: row.total_events_processed as u64,
            metadata: row.metadata,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProcessedEventRow {
    event_id: String,
    chain_id: String,
    contract_address: String,
    block_number: i64,
    transaction_hash: String,
    log_index: i64,
    event_name: String,
    processed_at: DateTime<Utc>,
    published: bool,
    metadata: serde_json::Value,
}

impl TryFrom<ProcessedEventRow> for ProcessedEvent {
    type Error = InfraError;

    fn try_from(row: ProcessedEventRow) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            event_id: row.event_id,
            chain_id: row.chain_id,
            contract_address: EthAddress::from_hex(&row.contract_address)
                .map_err(|e| InfraError::Store(sqlx::Error::Decode(Box::new(e))))?,
            block_number: row.block_number as u64,
            transaction_hash: row.transaction_hash,
            log_index: row.log_index as u64,
            event_name: row.event_name,
            processed_at: row.processed_at,
            published: row.published,
            metadata: row.metadata,
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    #[instrument(skip(self, checkpoint), fields(chain_id = %checkpoint.chain_id, contract = %checkpoint.contract_address))]
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO checkpoints (
                chain_id, contract_address, last_processed_block,
                last_processed_timestamp, total_events_processed, metadata, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (chain_id, contract_address) DO UPDATE SET
                last_processed_block = EXCLUDED.last_processed_block,
                last_processed_timestamp = EXCLUDED.last_processed_timestamp,
                total_events_processed = EXCLUDED.total_events_processed,
                metadata = EXCLUDED.metadata,
                updated_at = now()
            ",
        )
        .bind(&checkpoint.chain_id)
        .bind(checkpoint.contract_address.to_hex())
        .bind(checkpoint.last_processed_block as i64)
        .bind(checkpoint.last_processed_at)
        .bind(checkpoint.total_events_processed as i64)
        .bind(&checkpoint.metadata)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Store)?;
        Ok(())
    }

    #[instrument(skip(self), fields(chain_id = %chain_id, contract = %contract_address))]
    async fn get_checkpoint(
        &self,
        chain_id: &str,
        contract_address: EthAddress,
    ) -> Result<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r"
            SELECT chain_id, contract_address, last_processed_block,
                   last_processed_timestamp, total_events_processed, metadata
            FROM checkpoints
            WHERE chain_id = $1 AND contract_address = $2
            ",
        )
        .bind(chain_id)
        .bind(contract_address.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        row.map(TryInto::try_into).transpose().map_err(Into::into)
    }

    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    async fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO processed_events (
                event_id, chain_id, contract_address, block_number,
                transaction_hash, log_index, event_name, processed_at,
                published, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (event_id) DO NOTHING
            ",
        )
        .bind(&event.event_id)
        .bind(&event.chain_id)
        .bind(event.contract_address.to_hex())
        .bind(event.block_number as i64)
        .bind(&event.transaction_hash)
        .bind(event.log_index as i64)
        .bind(&event.event_name)
        .bind(event.processed_at)
        .bind(event.published)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM processed_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(InfraError::Store)?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn get_processed_events(
        &self,
        chain_id: &str,
        from_block: u64,
        to_block: u64,
        limit: u32,
    ) -> Result<Vec<ProcessedEvent>> {
        let rows = sqlx::query_as::<_, ProcessedEventRow>(
            r"
            SELECT event_id, chain_id, contract_address, block_number,
                   transaction_hash, log_index, event_name, processed_at,
                   published, metadata
            FROM processed_events
            WHERE chain_id = $1 AND block_number >= $2 AND block_number <= $3
            ORDER BY block_number DESC
            LIMIT $4
            ",
        )
        .bind(chain_id)
        .bind(from_block as i64)
        .bind(to_block as i64)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        rows.into_iter().map(TryInto::try_into).collect::<std::result::Result<_, _>>().map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(InfraError::Store)?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
