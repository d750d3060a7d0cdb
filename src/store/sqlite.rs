//! SQLite implementation of the checkpoint store port, using SQLx.
//!
//! This is the embedded backend: a single file, suited to development and
//! single-node deployments. The dedup gate relies on the `processed_events`
//! primary-key violation rather than an explicit `ON CONFLICT` clause,
//! mirroring the upstream Python relayer's embedded store.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use tracing::instrument;

use crate::error::{InfraError, Result};
use crate::ports::CheckpointStore;
use crate::types::entities::{Checkpoint, ProcessedEvent};
use crate::types::primitives::EthAddress;

/// Embedded checkpoint store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Create a new store with the given connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `checkpoints` and `processed_events` tables if they do not
    /// already exist.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id TEXT NOT NULL,
                contract_address TEXT NOT NULL,
                last_processed_block INTEGER NOT NULL,
                last_processed_timestamp TEXT NOT NULL,
                total_events_processed INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                updated_at TEXT,
                PRIMARY KEY (chain_id, contract_address)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS processed_events (
                event_id TEXT PRIMARY KEY,
                chain_id TEXT NOT NULL,
                contract_address TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                transaction_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                event_name TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                published INTEGER NOT NULL,
                metadata TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_processed_events_chain_block ON processed_events (chain_id, block_number)",
        )
        .execute(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_processed_events_tx_hash ON processed_events (transaction_hash)",
        )
        .execute(&self.pool)
        .await
        .map_err(InfraError::Store)?;

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
    metadata: Option<String>,
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
            metadata: row
                .metadata
                .map(|m| serde_json::from_str(&m))
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
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
    metadata: Option<String>,
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
            metadata: row
                .metadata
                .map(|m| serde_json::from_str(&m))
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self, checkpoint), fields(chain_id = %checkpoint.chain_id, contract = %checkpoint.contract_address))]
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO checkpoints (
                chain_id, contract_address, last_processed_block,
                last_processed_timestamp, total_events_processed, metadata, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(chain_id, contract_address) DO UPDATE SET
                last_processed_block = excluded.last_processed_block,
                last_processed_timestamp = excluded.last_processed_timestamp,
                total_events_processed = excluded.total_events_processed,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&checkpoint.chain_id)
        .bind(checkpoint.contract_address.to_hex())
        .bind(checkpoint.last_processed_block as i64)
        .bind(checkpoint.last_processed_at)
        .bind(checkpoint.total_events_processed as i64)
        .bind(checkpoint.metadata.to_string())
        .bind(Utc::now())
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
            WHERE chain_id = ?1 AND contract_address = ?2
            ",
        )
        .bind(chain_id)
        .bind(contract_address.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Store)?;

        row.map(TryInto::try_into).transpose().map_err(Into::into)
    }

    /// Relies on the `processed_events` primary-key violation to reject a
    /// duplicate `event_id` rather than checking existence first: this is
    /// the atomic dedup gate, not a performance shortcut.
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    async fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO processed_events (
                event_id, chain_id, contract_address, block_number,
                transaction_hash, log_index, event_name, processed_at,
                published, metadata
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
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
        .bind(event.metadata.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(InfraError::Store(e).into()),
        }
    }

    #[instrument(skip(self))]
    async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM processed_events WHERE event_id = ?1")
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
            WHERE chain_id = ?1 AND block_number >= ?2 AND block_number <= ?3
            ORDER BY block_number DESC
            LIMIT ?4
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
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < ?1")
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteCheckpointStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite pool");
        let store = SqliteCheckpointStore::new(pool);
        store.run_migrations().await.expect("migrations");
        store
    }

    #[tokio::test]
    async fn checkpoint_round_trip() {
        let store = test_store().await;
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
        let checkpoint = Checkpoint::new("1", addr, 100);

        store.save_checkpoint(&checkpoint).await.unwrap();
        let loaded = store.get_checkpoint("1", addr).await.unwrap().unwrap();
        assert_eq!(loaded.last_processed_block, 100);
    }

    #[tokio::test]
    async fn checkpoint_upsert_overwrites() {
        let store = test_store().await;
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();

        store.save_checkpoint(&Checkpoint::new("1", addr, 100)).await.unwrap();
        store.save_checkpoint(&Checkpoint::new("1", addr, 200)).await.unwrap();

        let loaded = store.get_checkpoint("1", addr).await.unwrap().unwrap();
        assert_eq!(loaded.last_processed_block, 200);
    }

    #[tokio::test]
    async fn mark_event_processed_dedup_gate() {
        let store = test_store().await;
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
        let event = ProcessedEvent {
            event_id: ProcessedEvent::build_event_id("1", "0xabc", 0),
            chain_id: "1".into(),
            contract_address: addr,
            block_number: 10,
            transaction_hash: "0xabc".into(),
            log_index: 0,
            event_name: "Transfer".into(),
            processed_at: Utc::now(),
            published: true,
            metadata: serde_json::Value::Null,
        };

        assert!(store.mark_event_processed(&event).await.unwrap());
        assert!(!store.mark_event_processed(&event).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_old_events_removes_only_stale_rows() {
        let store = test_store().await;
        let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
        let mut old_event = ProcessedEvent {
            event_id: ProcessedEvent::build_event_id("1", "0xold", 0),
            chain_id: "1".into(),
            contract_address: addr,
            block_number: 1,
            transaction_hash: "0xold".into(),
            log_index: 0,
            event_name: "Transfer".into(),
            processed_at: Utc::now() - chrono::Duration::days(10),
            published: true,
            metadata: serde_json::Value::Null,
        };
        let fresh_event = ProcessedEvent {
            event_id: ProcessedEvent::build_event_id("1", "0xnew", 0),
            processed_at: Utc::now(),
            ..old_event.clone()
        };
        old_event.event_id = ProcessedEvent::build_event_id("1", "0xold", 0);

        store.mark_event_processed(&old_event).await.unwrap();
        store.mark_event_processed(&fresh_event).await.unwrap();

        let deleted = store
            .cleanup_old_events(Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!store.is_event_processed(&old_event.event_id).await.unwrap());
        assert!(store.is_event_processed(&fresh_event.event_id).await.unwrap());
    }
}
