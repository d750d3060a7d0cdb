//! Data persistence layer (adapters for the [`crate::ports::CheckpointStore`] port).
//!
//! Two backends are provided, selected at startup by
//! [`crate::config::CheckpointStoreSettings::checkpoint_store_type`]:
//!
//! - [`SqliteCheckpointStore`] — embedded, single file, no external
//!   dependency. Suited to development and single-node deployments.
//! - [`PostgresCheckpointStore`] — networked, pooled connections, suited to
//!   deployments where the relayer runs alongside other services sharing
//!   the database.
//!
//! Both implement the same dedup-gate contract: `mark_event_processed`
//! returns `Ok(false)` rather than an error on a duplicate `event_id`.
//!
//! # Usage
//!
//! ```ignore
//! use evm_event_relayer::store::PostgresCheckpointStore;
//! use sqlx::postgres::PgPoolOptions;
//!
//! let pool = PgPoolOptions::new()
//!     .max_connections(10)
//!     .connect("postgres://localhost/relayer")
//!     .await?;
//!
//! let store = PostgresCheckpointStore::new(pool);
//! store.run_migrations().await?;
//! ```

mod postgres;
mod sqlite;

pub use postgres::PostgresCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

pub use sqlx::postgres::PgPool;
pub use sqlx::sqlite::SqlitePool;
