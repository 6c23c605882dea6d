//! Metadata store contract for the Strata memory substrate
//!
//! The durable store is an external collaborator: the core only needs the
//! narrow read/write surface below. Two implementations ship with the crate,
//! an in-memory store and a SQLite store.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::types::{
    AccessStats, Category, ChunkMetadata, ChunkUpsert, DecayUpdate, Direction, Relationship,
    RelationshipType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Storage backend trait defining all required operations
///
/// Calls are awaited one at a time by the core; no multi-call transaction
/// is assumed, so readers must tolerate rows changing between calls.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch a chunk, `None` when unknown
    async fn get_chunk_metadata(&self, id: &str) -> Result<Option<ChunkMetadata>>;

    /// Create or partially update a chunk; returns the stored record
    async fn upsert_chunk_metadata(&self, upsert: ChunkUpsert) -> Result<ChunkMetadata>;

    /// Delete a chunk and every edge touching it; returns whether it existed
    async fn delete_chunk_metadata(&self, id: &str) -> Result<bool>;

    async fn get_all_chunk_metadata(&self, include_archived: bool) -> Result<Vec<ChunkMetadata>>;

    /// Write decay scores; returns how many rows were updated
    async fn bulk_update_decay_scores(&self, updates: &[DecayUpdate]) -> Result<usize>;

    /// Archive one chunk; returns false when it was unknown or already archived
    async fn archive_chunk(&self, id: &str) -> Result<bool>;

    /// Archive every active chunk whose decay score is below `threshold`
    async fn archive_stale_chunks(&self, threshold: f64) -> Result<usize>;

    async fn get_relationships(&self, id: &str, direction: Direction) -> Result<Vec<Relationship>>;

    async fn add_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Delete edges matching (from, to, type); returns how many were removed
    async fn delete_relationship(
        &self,
        from: &str,
        to: &str,
        relationship_type: RelationshipType,
    ) -> Result<usize>;

    /// Distinct neighbours in either direction
    async fn get_related_chunk_ids(&self, id: &str) -> Result<Vec<String>>;

    /// Chunks accessed at or after `since`
    async fn get_access_stats(&self, since: DateTime<Utc>) -> Result<Vec<AccessStats>>;

    /// Reclaim space after deletes
    async fn vacuum(&self) -> Result<()>;

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>>;

    async fn upsert_category(&self, category: &Category) -> Result<()>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Record a read of the chunk (access count + 1, last access = `at`)
    ///
    /// The increment is a single atomic store operation, so concurrent reads
    /// of the same chunk are all counted. Unknown ids are `ChunkNotFound`.
    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<ChunkMetadata>;
}
