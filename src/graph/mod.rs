//! Relationship graph over chunk ids
//!
//! Edges live in the metadata store and are addressed by (from, to, type);
//! the graph keeps no in-memory references between chunks. Bidirectional
//! types are mirrored on write and on delete.

mod conflicts;
mod stats;
mod traversal;

pub use conflicts::{
    ConflictKind, Contradiction, ContradictionAction, ContradictionCandidate,
    ContradictionSuggestion,
};
pub use stats::{ConnectedChunk, GraphStats};
pub use traversal::{TraversalNode, TraversalOptions};

use crate::config::GraphConfig;
use crate::error::{Result, StrataError};
use crate::storage::MetadataStore;
use crate::types::{Direction, Metadata, Relationship, RelationshipType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Options for creating an edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipOptions {
    pub strength: f64,
    /// Overrides the type's own bidirectionality when set
    pub bidirectional: Option<bool>,
    pub metadata: Metadata,
}

impl RelationshipOptions {
    pub fn new(strength: f64) -> Self {
        Self {
            strength,
            bidirectional: None,
            metadata: Metadata::new(),
        }
    }

    pub fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = Some(bidirectional);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

impl Default for RelationshipOptions {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// One edge of a batch insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub from: String,
    pub to: String,
    pub relationship_type: RelationshipType,
    pub options: RelationshipOptions,
}

/// A batch entry that could not be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub created: usize,
    pub failures: Vec<BatchFailure>,
}

/// Options for `find_related`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedOptions {
    pub relationship_types: Option<Vec<RelationshipType>>,
    pub min_strength: f64,
    pub max_results: Option<usize>,
    pub include_transitive: bool,
    /// Defaults to the configured transitive depth
    pub transitive_depth: Option<usize>,
    pub exclude_archived: bool,
}

impl Default for RelatedOptions {
    fn default() -> Self {
        Self {
            relationship_types: None,
            min_strength: 0.0,
            max_results: None,
            include_transitive: false,
            transitive_depth: None,
            exclude_archived: false,
        }
    }
}

/// A neighbour of the queried chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedChunk {
    pub chunk_id: String,
    pub relationship_type: RelationshipType,
    pub strength: f64,
    /// Outgoing or Incoming for direct edges, Both for transitive hits
    pub direction: Direction,
    pub depth: usize,
    pub transitive: bool,
}

/// Typed relationship graph backed by the metadata store
pub struct RelationshipGraph {
    store: Arc<dyn MetadataStore>,
    config: GraphConfig,
}

impl RelationshipGraph {
    pub fn new(store: Arc<dyn MetadataStore>, config: GraphConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    fn validate(from: &str, to: &str, strength: f64) -> Result<()> {
        if from.is_empty() || to.is_empty() {
            return Err(StrataError::InvalidRelationship(
                "chunk ids must not be empty".to_string(),
            ));
        }
        if from == to {
            return Err(StrataError::InvalidRelationship(format!(
                "self-referencing edge on {}",
                from
            )));
        }
        if !(0.0..=1.0).contains(&strength) {
            return Err(StrataError::InvalidRelationship(format!(
                "strength {} outside [0, 1]",
                strength
            )));
        }
        Ok(())
    }

    /// Create an edge, plus its mirror when the edge is bidirectional
    ///
    /// Invalid input is rejected before any write. Existing identical edges
    /// are not deduplicated.
    pub async fn add_relationship(
        &self,
        from: &str,
        to: &str,
        relationship_type: RelationshipType,
        options: RelationshipOptions,
    ) -> Result<Relationship> {
        Self::validate(from, to, options.strength)?;

        let bidirectional = options
            .bidirectional
            .unwrap_or_else(|| relationship_type.is_bidirectional());
        let now = Utc::now();
        let edge = Relationship {
            from_chunk_id: from.to_string(),
            to_chunk_id: to.to_string(),
            relationship_type,
            strength: options.strength,
            metadata: options.metadata,
            created_at: now,
        };

        self.store.add_relationship(&edge).await?;
        if bidirectional {
            let mirror = Relationship {
                from_chunk_id: edge.to_chunk_id.clone(),
                to_chunk_id: edge.from_chunk_id.clone(),
                relationship_type: relationship_type.reverse(),
                strength: edge.strength,
                metadata: edge.metadata.clone(),
                created_at: now,
            };
            self.store.add_relationship(&mirror).await?;
        }

        debug!(
            "Added {} edge {} -> {} (strength {:.2}, mirrored: {})",
            relationship_type, from, to, edge.strength, bidirectional
        );
        Ok(edge)
    }

    /// Remove an edge and, for bidirectional edges, its mirror
    ///
    /// Returns the number of stored edges deleted.
    pub async fn remove_relationship(
        &self,
        from: &str,
        to: &str,
        relationship_type: RelationshipType,
        bidirectional: Option<bool>,
    ) -> Result<usize> {
        let mut removed = self
            .store
            .delete_relationship(from, to, relationship_type)
            .await?;
        if bidirectional.unwrap_or_else(|| relationship_type.is_bidirectional()) {
            removed += self
                .store
                .delete_relationship(to, from, relationship_type.reverse())
                .await?;
        }
        debug!("Removed {} {} edge(s) {} -> {}", removed, relationship_type, from, to);
        Ok(removed)
    }

    /// Best-effort batch insert: a failing entry is recorded, the rest proceed
    pub async fn add_relationship_batch(&self, edges: Vec<RelationshipSpec>) -> BatchResult {
        let mut result = BatchResult::default();
        for (index, spec) in edges.into_iter().enumerate() {
            match self
                .add_relationship(&spec.from, &spec.to, spec.relationship_type, spec.options)
                .await
            {
                Ok(_) => result.created += 1,
                Err(e) => {
                    warn!("Batch edge {} ({} -> {}) failed: {}", index, spec.from, spec.to, e);
                    result.failures.push(BatchFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }
        result
    }

    /// Direct neighbours in both directions, optionally extended transitively
    ///
    /// Results are unique per chunk (direct edges win over transitive hits)
    /// and sorted by strength, strongest first.
    pub async fn find_related(&self, id: &str, options: RelatedOptions) -> Result<Vec<RelatedChunk>> {
        let type_allowed = |t: RelationshipType| {
            options
                .relationship_types
                .as_ref()
                .map_or(true, |types| types.contains(&t))
        };

        let mut related: HashMap<String, RelatedChunk> = HashMap::new();
        for edge in self.store.get_relationships(id, Direction::Both).await? {
            if edge.from_chunk_id == edge.to_chunk_id
                || !type_allowed(edge.relationship_type)
                || edge.strength < options.min_strength
            {
                continue;
            }
            let (neighbour, direction) = if edge.from_chunk_id == id {
                (edge.to_chunk_id.clone(), Direction::Outgoing)
            } else {
                (edge.from_chunk_id.clone(), Direction::Incoming)
            };
            if options.exclude_archived && self.is_archived(&neighbour).await {
                continue;
            }

            let candidate = RelatedChunk {
                chunk_id: neighbour.clone(),
                relationship_type: edge.relationship_type,
                strength: edge.strength,
                direction,
                depth: 1,
                transitive: false,
            };
            match related.get(&neighbour) {
                Some(existing) if existing.strength >= candidate.strength => {}
                _ => {
                    related.insert(neighbour, candidate);
                }
            }
        }

        if options.include_transitive {
            let traversal = TraversalOptions {
                max_depth: options
                    .transitive_depth
                    .unwrap_or(self.config.transitive_depth),
                relationship_types: options.relationship_types.clone(),
                min_strength: options.min_strength,
                exclude_archived: options.exclude_archived,
                direction: Direction::Both,
            };
            for node in self.traverse(id, traversal).await? {
                if node.depth < 2 || related.contains_key(&node.chunk_id) {
                    continue;
                }
                related.insert(
                    node.chunk_id.clone(),
                    RelatedChunk {
                        chunk_id: node.chunk_id,
                        relationship_type: node.relationship_type,
                        strength: node.strength,
                        direction: Direction::Both,
                        depth: node.depth,
                        transitive: true,
                    },
                );
            }
        }

        let mut related: Vec<RelatedChunk> = related.into_values().collect();
        related.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.depth.cmp(&b.depth))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        if let Some(max) = options.max_results {
            related.truncate(max);
        }
        Ok(related)
    }

    /// Mark `new_id` as replacing `old_id`
    pub async fn mark_supersedes(&self, new_id: &str, old_id: &str) -> Result<Relationship> {
        let options = RelationshipOptions::new(self.config.supersedes_strength)
            .bidirectional(false)
            .with_metadata("reason", "superseded");
        self.add_relationship(new_id, old_id, RelationshipType::Supersedes, options)
            .await
    }

    /// Record a mutual contradiction between two chunks
    pub async fn mark_contradiction(
        &self,
        a: &str,
        b: &str,
        reason: Option<&str>,
    ) -> Result<Relationship> {
        let options = RelationshipOptions::new(self.config.contradiction_strength)
            .bidirectional(true)
            .with_metadata("reason", reason.unwrap_or("contradiction"));
        self.add_relationship(a, b, RelationshipType::Contradicts, options)
            .await
    }

    /// Missing metadata counts as active; reads never fail on it
    async fn is_archived(&self, id: &str) -> bool {
        match self.store.get_chunk_metadata(id).await {
            Ok(Some(chunk)) => chunk.is_archived,
            Ok(None) => false,
            Err(e) => {
                warn!("Could not read metadata for {}: {}", id, e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    pub(crate) fn graph_with_store() -> (RelationshipGraph, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let graph = RelationshipGraph::new(store.clone(), GraphConfig::default());
        (graph, store)
    }

    #[tokio::test]
    async fn test_bidirectional_symmetry() {
        let (graph, store) = graph_with_store();
        graph
            .add_relationship("a", "b", RelationshipType::SimilarTo, RelationshipOptions::new(0.9))
            .await
            .unwrap();

        let back = store.get_relationships("b", Direction::Outgoing).await.unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].to_chunk_id, "a");
        assert_eq!(back[0].relationship_type, RelationshipType::SimilarTo);

        let removed = graph
            .remove_relationship("a", "b", RelationshipType::SimilarTo, None)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.relationship_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forced_mirror_uses_reverse_type() {
        let (graph, store) = graph_with_store();
        graph
            .add_relationship(
                "cause",
                "effect",
                RelationshipType::LeadsTo,
                RelationshipOptions::new(0.6).bidirectional(true),
            )
            .await
            .unwrap();

        let back = store
            .get_relationships("effect", Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(back[0].relationship_type, RelationshipType::DerivesFrom);

        let removed = graph
            .remove_relationship("cause", "effect", RelationshipType::LeadsTo, Some(true))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_unidirectional_edge_is_not_mirrored() {
        let (graph, store) = graph_with_store();
        graph
            .add_relationship("a", "b", RelationshipType::LeadsTo, RelationshipOptions::new(0.6))
            .await
            .unwrap();
        assert_eq!(store.relationship_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_edges_rejected_before_write() {
        let (graph, store) = graph_with_store();
        let bad_strength = graph
            .add_relationship("a", "b", RelationshipType::RelatesTo, RelationshipOptions::new(1.5))
            .await;
        assert!(matches!(bad_strength, Err(StrataError::InvalidRelationship(_))));

        let self_loop = graph
            .add_relationship("a", "a", RelationshipType::RelatesTo, RelationshipOptions::new(0.5))
            .await;
        assert!(self_loop.is_err());
        assert_eq!(store.relationship_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_records_failures_by_index() {
        let (graph, _store) = graph_with_store();
        let spec = |from: &str, to: &str, strength: f64| RelationshipSpec {
            from: from.to_string(),
            to: to.to_string(),
            relationship_type: RelationshipType::LeadsTo,
            options: RelationshipOptions::new(strength),
        };

        let result = graph
            .add_relationship_batch(vec![
                spec("a", "b", 0.5),
                spec("b", "b", 0.5),
                spec("b", "c", 2.0),
                spec("c", "d", 0.5),
            ])
            .await;

        assert_eq!(result.created, 2);
        let indexes: Vec<usize> = result.failures.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_find_related_direct_and_transitive() {
        let (graph, _store) = graph_with_store();
        let opts = RelationshipOptions::new;
        graph.add_relationship("a", "b", RelationshipType::LeadsTo, opts(0.4)).await.unwrap();
        graph.add_relationship("c", "a", RelationshipType::Elaborates, opts(0.9)).await.unwrap();
        graph.add_relationship("b", "d", RelationshipType::LeadsTo, opts(0.8)).await.unwrap();
        graph.add_relationship("d", "e", RelationshipType::LeadsTo, opts(0.8)).await.unwrap();

        let direct = graph.find_related("a", RelatedOptions::default()).await.unwrap();
        let ids: Vec<&str> = direct.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(direct[0].direction, Direction::Incoming);
        assert_eq!(direct[1].direction, Direction::Outgoing);

        let with_transitive = graph
            .find_related(
                "a",
                RelatedOptions {
                    include_transitive: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let d = with_transitive.iter().find(|r| r.chunk_id == "d").unwrap();
        assert!(d.transitive);
        assert_eq!(d.depth, 2);
        // Depth 3 is beyond the default transitive depth
        assert!(with_transitive.iter().all(|r| r.chunk_id != "e"));
        // Direct edge to b is kept even though b is reachable transitively
        let b = with_transitive.iter().find(|r| r.chunk_id == "b").unwrap();
        assert!(!b.transitive);

        let limited = graph
            .find_related(
                "a",
                RelatedOptions {
                    include_transitive: true,
                    max_results: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].chunk_id, "c");
        assert_eq!(limited[1].chunk_id, "d");
    }

    #[tokio::test]
    async fn test_find_related_filters() {
        let (graph, _store) = graph_with_store();
        let opts = RelationshipOptions::new;
        graph.add_relationship("a", "b", RelationshipType::LeadsTo, opts(0.2)).await.unwrap();
        graph.add_relationship("a", "c", RelationshipType::PartOf, opts(0.9)).await.unwrap();

        let strong = graph
            .find_related(
                "a",
                RelatedOptions {
                    min_strength: 0.5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].chunk_id, "c");

        let causal = graph
            .find_related(
                "a",
                RelatedOptions {
                    relationship_types: Some(vec![RelationshipType::LeadsTo]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(causal.len(), 1);
        assert_eq!(causal[0].chunk_id, "b");
    }
}
