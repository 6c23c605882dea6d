// Graph statistics
//
// Edges are discovered by walking outward from every chunk with metadata, so
// edges whose endpoints have no metadata in any component are not counted.
// The max depth is an approximation sampled from the most connected chunks,
// not the diameter.

use super::{RelationshipGraph, TraversalOptions};
use crate::error::Result;
use crate::types::{Direction, Relationship, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedChunk {
    pub chunk_id: String,
    /// Counted edges touching the chunk, in either direction
    pub connections: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_chunks: usize,
    /// Mirrored pairs count once
    pub total_relationships: usize,
    pub relationships_by_type: BTreeMap<String, usize>,
    /// Mean counted edges per chunk with at least one edge; two typed edges
    /// between the same pair count twice
    pub avg_connections: f64,
    pub isolated_chunks: usize,
    pub most_connected: Vec<ConnectedChunk>,
    pub approx_max_depth: usize,
}

type EdgeKey = (String, String, RelationshipType);

fn edge_key(edge: &Relationship) -> EdgeKey {
    (
        edge.from_chunk_id.clone(),
        edge.to_chunk_id.clone(),
        edge.relationship_type,
    )
}

fn mirror_key(edge: &Relationship) -> EdgeKey {
    (
        edge.to_chunk_id.clone(),
        edge.from_chunk_id.clone(),
        edge.relationship_type.reverse(),
    )
}

impl RelationshipGraph {
    pub async fn get_stats(&self) -> Result<GraphStats> {
        let chunks = self.store.get_all_chunk_metadata(true).await?;
        let chunk_ids: Vec<String> = chunks.into_iter().map(|c| c.id).collect();

        // Collect every reachable edge once
        let mut edges: HashMap<EdgeKey, Relationship> = HashMap::new();
        let mut seen: HashSet<String> = chunk_ids.iter().cloned().collect();
        let mut queue: VecDeque<String> = chunk_ids.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            for edge in self.store.get_relationships(&id, Direction::Both).await? {
                let other = edge.other_end(&id).to_string();
                if seen.insert(other.clone()) {
                    queue.push_back(other);
                }
                edges.entry(edge_key(&edge)).or_insert(edge);
            }
        }

        let mut stats = GraphStats {
            total_chunks: chunk_ids.len(),
            ..Default::default()
        };
        let mut degree: HashMap<&str, usize> = HashMap::new();
        for (key, edge) in &edges {
            let mirror = mirror_key(edge);
            if edges.contains_key(&mirror) && mirror < *key {
                continue;
            }
            stats.total_relationships += 1;
            *stats
                .relationships_by_type
                .entry(edge.relationship_type.to_string())
                .or_insert(0) += 1;

            if edge.from_chunk_id != edge.to_chunk_id {
                *degree.entry(&edge.from_chunk_id).or_insert(0) += 1;
                *degree.entry(&edge.to_chunk_id).or_insert(0) += 1;
            }
        }

        stats.isolated_chunks = chunk_ids
            .iter()
            .filter(|id| !degree.contains_key(id.as_str()))
            .count();

        let mut connected: Vec<ConnectedChunk> = degree
            .iter()
            .map(|(id, count)| ConnectedChunk {
                chunk_id: id.to_string(),
                connections: *count,
            })
            .collect();
        connected.sort_by(|a, b| {
            b.connections
                .cmp(&a.connections)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        if !connected.is_empty() {
            let total: usize = connected.iter().map(|c| c.connections).sum();
            stats.avg_connections = total as f64 / connected.len() as f64;
        }

        for sample in connected.iter().take(self.config.stats_depth_samples) {
            let options = TraversalOptions {
                max_depth: self.config.max_depth_ceiling,
                exclude_archived: false,
                direction: Direction::Both,
                ..self.traversal_options()
            };
            let reached = self.traverse(&sample.chunk_id, options).await?;
            let depth = reached.iter().map(|n| n.depth).max().unwrap_or(0);
            stats.approx_max_depth = stats.approx_max_depth.max(depth);
        }

        connected.truncate(self.config.top_connected);
        stats.most_connected = connected;

        debug!(
            "Graph stats: {} chunks, {} relationships, {} isolated",
            stats.total_chunks, stats.total_relationships, stats.isolated_chunks
        );
        Ok(stats)
    }
}
