//! In-memory metadata store
//!
//! Lock-guarded maps implementing [`MetadataStore`]. Used by tests and by
//! hosts that keep metadata in process.

use super::MetadataStore;
use crate::error::{Result, StrataError};
use crate::types::{
    AccessStats, Category, ChunkMetadata, ChunkUpsert, DecayUpdate, Direction, Relationship,
    RelationshipType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    chunks: HashMap<String, ChunkMetadata>,
    relationships: Vec<Relationship>,
    categories: BTreeMap<String, Category>,
}

/// In-memory store
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a complete record as-is, bypassing upsert defaults
    pub fn insert_chunk(&self, chunk: ChunkMetadata) -> Result<()> {
        self.write()?.chunks.insert(chunk.id.clone(), chunk);
        Ok(())
    }

    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.read()?.chunks.len())
    }

    pub fn relationship_count(&self) -> Result<usize> {
        Ok(self.read()?.relationships.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| StrataError::Storage(format!("store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| StrataError::Storage(format!("store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn get_chunk_metadata(&self, id: &str) -> Result<Option<ChunkMetadata>> {
        Ok(self.read()?.chunks.get(id).cloned())
    }

    async fn upsert_chunk_metadata(&self, upsert: ChunkUpsert) -> Result<ChunkMetadata> {
        let mut inner = self.write()?;
        let existing = inner.chunks.get(&upsert.id).cloned();
        let chunk = upsert.apply(existing, Utc::now());
        inner.chunks.insert(chunk.id.clone(), chunk.clone());
        Ok(chunk)
    }

    async fn delete_chunk_metadata(&self, id: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let existed = inner.chunks.remove(id).is_some();
        inner
            .relationships
            .retain(|r| r.from_chunk_id != id && r.to_chunk_id != id);
        Ok(existed)
    }

    async fn get_all_chunk_metadata(&self, include_archived: bool) -> Result<Vec<ChunkMetadata>> {
        let inner = self.read()?;
        let mut chunks: Vec<ChunkMetadata> = inner
            .chunks
            .values()
            .filter(|c| include_archived || !c.is_archived)
            .cloned()
            .collect();
        chunks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(chunks)
    }

    async fn bulk_update_decay_scores(&self, updates: &[DecayUpdate]) -> Result<usize> {
        let mut inner = self.write()?;
        let now = Utc::now();
        let mut updated = 0;
        for update in updates {
            if let Some(chunk) = inner.chunks.get_mut(&update.id) {
                chunk.decay_score = update.score.clamp(0.0, 1.0);
                chunk.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<ChunkMetadata> {
        let mut inner = self.write()?;
        let chunk = inner
            .chunks
            .get_mut(id)
            .ok_or_else(|| StrataError::ChunkNotFound(id.to_string()))?;
        chunk.access_count = chunk.access_count.saturating_add(1);
        chunk.last_accessed_at = Some(at);
        chunk.updated_at = at;
        Ok(chunk.clone())
    }

    async fn archive_chunk(&self, id: &str) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.chunks.get_mut(id) {
            Some(chunk) if !chunk.is_archived => {
                chunk.is_archived = true;
                chunk.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn archive_stale_chunks(&self, threshold: f64) -> Result<usize> {
        let mut inner = self.write()?;
        let now = Utc::now();
        let mut archived = 0;
        for chunk in inner.chunks.values_mut() {
            if !chunk.is_archived && chunk.decay_score < threshold {
                chunk.is_archived = true;
                chunk.updated_at = now;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn get_relationships(&self, id: &str, direction: Direction) -> Result<Vec<Relationship>> {
        let inner = self.read()?;
        Ok(inner
            .relationships
            .iter()
            .filter(|r| match direction {
                Direction::Outgoing => r.from_chunk_id == id,
                Direction::Incoming => r.to_chunk_id == id,
                Direction::Both => r.from_chunk_id == id || r.to_chunk_id == id,
            })
            .cloned()
            .collect())
    }

    async fn add_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.write()?.relationships.push(relationship.clone());
        Ok(())
    }

    async fn delete_relationship(
        &self,
        from: &str,
        to: &str,
        relationship_type: RelationshipType,
    ) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.relationships.len();
        inner.relationships.retain(|r| {
            !(r.from_chunk_id == from && r.to_chunk_id == to && r.relationship_type == relationship_type)
        });
        Ok(before - inner.relationships.len())
    }

    async fn get_related_chunk_ids(&self, id: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        let related: BTreeSet<String> = inner
            .relationships
            .iter()
            .filter_map(|r| {
                if r.from_chunk_id == id && r.to_chunk_id != id {
                    Some(r.to_chunk_id.clone())
                } else if r.to_chunk_id == id && r.from_chunk_id != id {
                    Some(r.from_chunk_id.clone())
                } else {
                    None
                }
            })
            .collect();
        Ok(related.into_iter().collect())
    }

    async fn get_access_stats(&self, since: DateTime<Utc>) -> Result<Vec<AccessStats>> {
        let inner = self.read()?;
        let mut stats: Vec<AccessStats> = inner
            .chunks
            .values()
            .filter_map(|c| match c.last_accessed_at {
                Some(at) if at >= since => Some(AccessStats {
                    chunk_id: c.id.clone(),
                    access_count: c.access_count,
                    last_accessed_at: at,
                }),
                _ => None,
            })
            .collect();
        stats.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(stats)
    }

    async fn vacuum(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.chunks.shrink_to_fit();
        inner.relationships.shrink_to_fit();
        Ok(())
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.read()?.categories.get(name).cloned())
    }

    async fn upsert_category(&self, category: &Category) -> Result<()> {
        self.write()?
            .categories
            .insert(category.name.clone(), category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.read()?.categories.values().cloned().collect())
    }
}
