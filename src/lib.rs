//! Strata - Decay-Aware Memory Substrate
//!
//! The memory layer underneath a retrieval-augmented knowledge base:
//! - Decay scoring from age, access pattern and importance
//! - A typed relationship graph between chunks (supersession, contradiction,
//!   causality, structure)
//! - Hybrid re-ranking of retrieved candidates with tiered, summary-first
//!   retrieval
//! - A maintenance scheduler for decay refresh, consolidation, summaries,
//!   reindexing and cleanup
//!
//! # Architecture
//!
//! The four components share one [`MetadataStore`] and are wired explicitly
//! at process start; there are no global instances.
//! - **Storage**: metadata store contract plus in-memory and SQLite backends
//! - **Decay**: [`DecayEngine`]
//! - **Graph**: [`RelationshipGraph`]
//! - **Scoring**: [`HybridScorer`]
//! - **Maintenance**: [`MaintenanceScheduler`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_core::{
//!     DecayEngine, HybridScorer, InMemoryStore, MaintenanceScheduler, RelationshipGraph,
//!     ScoringCandidate, ScoringContext, StrataConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> strata_core::Result<()> {
//!     let config = StrataConfig::default();
//!     let store = Arc::new(InMemoryStore::new());
//!     let decay = Arc::new(DecayEngine::new(config.decay.clone()));
//!     let graph = Arc::new(RelationshipGraph::new(store.clone(), config.graph.clone()));
//!     let scorer = HybridScorer::new(store.clone(), graph.clone(), config.scoring.clone());
//!
//!     graph.mark_supersedes("pool-v2", "pool-v1").await?;
//!     let results = scorer
//!         .score(
//!             vec![ScoringCandidate::new("pool-v2", "Use 20 connections", 0.82)],
//!             "connection pool size",
//!             &ScoringContext::default(),
//!         )
//!         .await?;
//!
//!     let scheduler = Arc::new(MaintenanceScheduler::new(store, decay, graph, config.maintenance));
//!     scheduler.start().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decay;
pub mod error;
pub mod graph;
pub mod maintenance;
pub mod scoring;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{
    ConfigError, DecayConfig, GraphConfig, MaintenanceConfig, ScoringConfig, StrataConfig,
};
pub use decay::{DecayEngine, DecayUpdateResult};
pub use error::{Result, StrataError};
pub use graph::{RelatedOptions, RelationshipGraph, RelationshipOptions, TraversalOptions};
pub use maintenance::{
    CategorySummarizer, JobOptions, JobType, MaintenanceJobResult, MaintenanceScheduler,
};
pub use scoring::{
    CategorySelector, HybridScorer, RetrievalBackend, ScoredResult, ScoringCandidate,
    ScoringContext, TieredOptions,
};
pub use storage::{InMemoryStore, MetadataStore, SqliteStore};
pub use types::{
    Category, ChunkMetadata, ChunkType, ChunkUpsert, Direction, Relationship, RelationshipType,
};
