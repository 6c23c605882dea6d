//! Common test utilities and helpers

#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use strata_core::{
    ChunkMetadata, ChunkType, DecayEngine, HybridScorer, InMemoryStore, MaintenanceScheduler,
    RelationshipGraph, SqliteStore, StrataConfig,
};
use tempfile::TempDir;

/// The four components over one shared store
pub struct Substrate<S> {
    pub store: Arc<S>,
    pub decay: Arc<DecayEngine>,
    pub graph: Arc<RelationshipGraph>,
    pub scorer: HybridScorer,
    pub scheduler: Arc<MaintenanceScheduler>,
}

fn wire<S: strata_core::MetadataStore + 'static>(store: Arc<S>, config: StrataConfig) -> Substrate<S> {
    let decay = Arc::new(DecayEngine::new(config.decay.clone()));
    let graph = Arc::new(RelationshipGraph::new(store.clone(), config.graph.clone()));
    let scorer = HybridScorer::new(store.clone(), graph.clone(), config.scoring.clone());
    let scheduler = Arc::new(MaintenanceScheduler::new(
        store.clone(),
        decay.clone(),
        graph.clone(),
        config.maintenance.clone(),
    ));
    Substrate {
        store,
        decay,
        graph,
        scorer,
        scheduler,
    }
}

pub fn in_memory_substrate() -> Substrate<InMemoryStore> {
    wire(Arc::new(InMemoryStore::new()), StrataConfig::default())
}

/// SQLite-backed substrate; keep the `TempDir` alive for the test's duration
pub async fn sqlite_substrate() -> (Substrate<SqliteStore>, TempDir) {
    let (store, temp) = create_test_store().await;
    (wire(Arc::new(store), StrataConfig::default()), temp)
}

pub async fn create_test_store() -> (SqliteStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("strata_test.db");
    let store = SqliteStore::open(&db_path).await.unwrap();
    (store, temp_dir)
}

/// Chunk created `age_days` ago with the given importance
pub fn create_test_chunk(id: &str, chunk_type: ChunkType, age_days: i64, importance: f64) -> ChunkMetadata {
    let mut chunk = ChunkMetadata::new(id, format!("content of {}", id), chunk_type);
    chunk.created_at = Utc::now() - Duration::days(age_days);
    chunk.updated_at = chunk.created_at;
    chunk.importance = importance;
    chunk
}
