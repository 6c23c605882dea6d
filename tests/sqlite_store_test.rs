//! Integration tests for the SQLite metadata store
//!
//! Every test opens a fresh database file in its own temporary directory.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use common::create_test_store;
use strata_core::types::{Category, DecayUpdate, Relationship};
use strata_core::{ChunkType, ChunkUpsert, Direction, MetadataStore, RelationshipType, SqliteStore};

#[tokio::test]
async fn test_upsert_and_partial_update() {
    let (store, _temp) = create_test_store().await;

    let created = store
        .upsert_chunk_metadata(
            ChunkUpsert::new("c1")
                .content("Use a pool of 20 connections")
                .source("docs/db.md")
                .chunk_type(ChunkType::Decision)
                .importance(0.8),
        )
        .await
        .unwrap();
    assert_eq!(created.decay_score, 1.0);
    assert_eq!(created.access_count, 0);

    store
        .upsert_chunk_metadata(ChunkUpsert::new("c1").importance(0.3))
        .await
        .unwrap();

    let chunk = store.get_chunk_metadata("c1").await.unwrap().unwrap();
    assert_eq!(chunk.content, "Use a pool of 20 connections");
    assert_eq!(chunk.source, "docs/db.md");
    assert_eq!(chunk.chunk_type, ChunkType::Decision);
    assert!((chunk.importance - 0.3).abs() < 1e-9);
    assert!(store.get_chunk_metadata("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_decay_updates_and_archival() {
    let (store, _temp) = create_test_store().await;
    for id in ["a", "b", "c"] {
        store.upsert_chunk_metadata(ChunkUpsert::new(id)).await.unwrap();
    }

    let updated = store
        .bulk_update_decay_scores(&[
            DecayUpdate { id: "a".to_string(), score: 0.9 },
            DecayUpdate { id: "b".to_string(), score: 0.1 },
            DecayUpdate { id: "ghost".to_string(), score: 0.5 },
        ])
        .await
        .unwrap();
    assert_eq!(updated, 2);

    assert_eq!(store.archive_stale_chunks(0.2).await.unwrap(), 1);
    let active: Vec<String> = store
        .get_all_chunk_metadata(false)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(active, vec!["a", "c"]);
    assert_eq!(store.get_all_chunk_metadata(true).await.unwrap().len(), 3);

    assert!(store.archive_chunk("a").await.unwrap());
    assert!(!store.archive_chunk("a").await.unwrap());
    assert!(!store.archive_chunk("ghost").await.unwrap());
}

#[tokio::test]
async fn test_relationships_by_direction() {
    let (store, _temp) = create_test_store().await;
    let mut edge = Relationship::new("a", "b", RelationshipType::LeadsTo, 0.7);
    edge.metadata.insert("reason".to_string(), "ordering".into());
    store.add_relationship(&edge).await.unwrap();
    store
        .add_relationship(&Relationship::new("c", "a", RelationshipType::PartOf, 0.4))
        .await
        .unwrap();
    store
        .add_relationship(&Relationship::new("b", "a", RelationshipType::DerivesFrom, 0.7))
        .await
        .unwrap();

    let outgoing = store.get_relationships("a", Direction::Outgoing).await.unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].metadata.get("reason").unwrap(), "ordering");
    assert_eq!(store.get_relationships("a", Direction::Incoming).await.unwrap().len(), 2);
    assert_eq!(store.get_relationships("a", Direction::Both).await.unwrap().len(), 3);

    assert_eq!(store.get_related_chunk_ids("a").await.unwrap(), vec!["b", "c"]);

    let removed = store
        .delete_relationship("a", "b", RelationshipType::LeadsTo)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.get_relationships("a", Direction::Both).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_chunk_removes_its_edges() {
    let (store, _temp) = create_test_store().await;
    store.upsert_chunk_metadata(ChunkUpsert::new("a")).await.unwrap();
    store
        .add_relationship(&Relationship::new("a", "b", RelationshipType::Solves, 0.9))
        .await
        .unwrap();
    store
        .add_relationship(&Relationship::new("b", "c", RelationshipType::Solves, 0.9))
        .await
        .unwrap();

    assert!(store.delete_chunk_metadata("a").await.unwrap());
    assert!(!store.delete_chunk_metadata("a").await.unwrap());
    assert!(store.get_relationships("a", Direction::Both).await.unwrap().is_empty());
    assert_eq!(store.get_relationships("b", Direction::Both).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_record_access_and_stats() {
    let (store, _temp) = create_test_store().await;
    store.upsert_chunk_metadata(ChunkUpsert::new("read")).await.unwrap();
    store
        .upsert_chunk_metadata(
            ChunkUpsert::new("old-read").last_accessed_at(Utc::now() - Duration::days(3)),
        )
        .await
        .unwrap();
    store.upsert_chunk_metadata(ChunkUpsert::new("unread")).await.unwrap();

    let now = Utc::now();
    store.record_access("read", now).await.unwrap();
    let chunk = store.record_access("read", now).await.unwrap();
    assert_eq!(chunk.access_count, 2);

    let stats = store.get_access_stats(now - Duration::hours(1)).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].chunk_id, "read");
    assert_eq!(stats[0].access_count, 2);

    assert!(store.record_access("missing", now).await.is_err());
}

#[tokio::test]
async fn test_categories() {
    let (store, _temp) = create_test_store().await;
    store
        .upsert_category(&Category::new("databases", "Postgres for user data", 4))
        .await
        .unwrap();
    store
        .upsert_category(&Category::new("auth", "OAuth via the gateway", 2))
        .await
        .unwrap();
    store
        .upsert_category(&Category::new("databases", "Postgres and Redis", 6))
        .await
        .unwrap();

    let databases = store.get_category_by_name("databases").await.unwrap().unwrap();
    assert_eq!(databases.summary, "Postgres and Redis");
    assert_eq!(databases.item_count, 6);

    let names: Vec<String> = store
        .list_categories()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["auth", "databases"]);
    assert!(store.get_category_by_name("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let (store, temp) = create_test_store().await;
    store
        .upsert_chunk_metadata(ChunkUpsert::new("kept").chunk_type(ChunkType::Pattern))
        .await
        .unwrap();
    store
        .add_relationship(&Relationship::new("kept", "other", RelationshipType::ExampleOf, 0.6))
        .await
        .unwrap();
    store.vacuum().await.unwrap();
    drop(store);

    let reopened = SqliteStore::open(temp.path().join("strata_test.db")).await.unwrap();
    let chunk = reopened.get_chunk_metadata("kept").await.unwrap().unwrap();
    assert_eq!(chunk.chunk_type, ChunkType::Pattern);
    assert_eq!(
        reopened.get_relationships("kept", Direction::Outgoing).await.unwrap()[0].relationship_type,
        RelationshipType::ExampleOf
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_upserts_all_succeed() {
    let (store, _temp) = create_test_store().await;
    let store = Arc::new(store);

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert_chunk_metadata(ChunkUpsert::new(format!("chunk-{}", i)).importance(0.6))
                    .await
            })
        })
        .collect();

    let mut failures = Vec::new();
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            failures.push(e.to_string());
        }
    }
    assert!(failures.is_empty(), "failed upserts: {:?}", failures);
    assert_eq!(store.get_all_chunk_metadata(true).await.unwrap().len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_record_access_counts_every_read() {
    let (store, _temp) = create_test_store().await;
    let store = Arc::new(store);
    store.upsert_chunk_metadata(ChunkUpsert::new("hot")).await.unwrap();

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.record_access("hot", Utc::now()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let chunk = store.get_chunk_metadata("hot").await.unwrap().unwrap();
    assert_eq!(chunk.access_count, 40);
    assert!(chunk.last_accessed_at.is_some());
}
