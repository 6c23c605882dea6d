// Breadth-first traversal and connected components
//
// Every walk carries its own visited set, so cycles and mirrored edges are
// harmless. A node is emitted once, at the depth it was first reached.

use super::RelationshipGraph;
use crate::error::Result;
use crate::types::{Direction, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Options for `traverse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalOptions {
    /// Capped by the configured depth ceiling
    pub max_depth: usize,
    pub relationship_types: Option<Vec<RelationshipType>>,
    pub min_strength: f64,
    pub exclude_archived: bool,
    pub direction: Direction,
}

impl TraversalOptions {
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            relationship_types: None,
            min_strength: 0.0,
            exclude_archived: true,
            direction: Direction::Outgoing,
        }
    }
}

/// A chunk reached during traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalNode {
    pub chunk_id: String,
    pub depth: usize,
    /// Ids from the start chunk to this one, both inclusive
    pub path: Vec<String>,
    /// Edge through which the node was first reached
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

impl RelationshipGraph {
    /// Default options with the configured default traversal depth
    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions::with_depth(self.config.default_traversal_depth)
    }

    /// Breadth-first walk from `start_id`; the start itself is not emitted
    pub async fn traverse(&self, start_id: &str, options: TraversalOptions) -> Result<Vec<TraversalNode>> {
        let max_depth = options.max_depth.min(self.config.max_depth_ceiling);
        let mut visited: HashSet<String> = HashSet::from([start_id.to_string()]);
        let mut queue: VecDeque<(String, usize, Vec<String>)> =
            VecDeque::from([(start_id.to_string(), 0, vec![start_id.to_string()])]);
        let mut nodes = Vec::new();

        while let Some((current, depth, path)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for edge in self.store.get_relationships(&current, options.direction).await? {
                if let Some(types) = &options.relationship_types {
                    if !types.contains(&edge.relationship_type) {
                        continue;
                    }
                }
                if edge.strength < options.min_strength {
                    continue;
                }

                let neighbour = edge.other_end(&current).to_string();
                if visited.contains(&neighbour) {
                    continue;
                }
                visited.insert(neighbour.clone());
                if options.exclude_archived && self.is_archived(&neighbour).await {
                    continue;
                }

                let mut next_path = path.clone();
                next_path.push(neighbour.clone());
                nodes.push(TraversalNode {
                    chunk_id: neighbour.clone(),
                    depth: depth + 1,
                    path: next_path.clone(),
                    relationship_type: edge.relationship_type,
                    strength: edge.strength,
                });
                queue.push_back((neighbour, depth + 1, next_path));
            }
        }

        debug!(
            "Traversal from {} reached {} chunks (max depth {})",
            start_id,
            nodes.len(),
            max_depth
        );
        Ok(nodes)
    }

    /// Undirected connected components of active chunks, largest first
    pub async fn find_clusters(&self, min_size: usize) -> Result<Vec<Vec<String>>> {
        let active: HashSet<String> = self
            .store
            .get_all_chunk_metadata(false)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let mut ids: Vec<&String> = active.iter().collect();
        ids.sort();

        let mut visited: HashSet<String> = HashSet::new();
        let mut clusters = Vec::new();

        for start in ids {
            if visited.contains(start) {
                continue;
            }

            let mut cluster = Vec::new();
            let mut queue = VecDeque::from([start.clone()]);
            visited.insert(start.clone());

            while let Some(id) = queue.pop_front() {
                for neighbour in self.store.get_related_chunk_ids(&id).await? {
                    if active.contains(&neighbour) && visited.insert(neighbour.clone()) {
                        queue.push_back(neighbour);
                    }
                }
                cluster.push(id);
            }

            if cluster.len() >= min_size {
                cluster.sort();
                clusters.push(cluster);
            }
        }

        clusters.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::graph_with_store;
    use super::super::RelationshipOptions;
    use super::*;
    use crate::storage::MetadataStore;
    use crate::types::ChunkUpsert;

    async fn chain(graph: &RelationshipGraph, ids: &[&str]) {
        for pair in ids.windows(2) {
            graph
                .add_relationship(pair[0], pair[1], RelationshipType::LeadsTo, RelationshipOptions::new(0.7))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_traverse_chain() {
        let (graph, _store) = graph_with_store();
        chain(&graph, &["a", "b", "c", "d"]).await;

        let nodes = graph.traverse("a", TraversalOptions::with_depth(3)).await.unwrap();
        let summary: Vec<(&str, usize)> = nodes.iter().map(|n| (n.chunk_id.as_str(), n.depth)).collect();
        assert_eq!(summary, vec![("b", 1), ("c", 2), ("d", 3)]);
        assert_eq!(nodes[2].path, vec!["a", "b", "c", "d"]);
        assert_eq!(nodes[0].relationship_type, RelationshipType::LeadsTo);

        let shallow = graph.traverse("a", TraversalOptions::with_depth(2)).await.unwrap();
        assert_eq!(shallow.len(), 2);
    }

    #[tokio::test]
    async fn test_traversal_options_follow_configured_depth() {
        let store = std::sync::Arc::new(crate::storage::InMemoryStore::new());
        let config = crate::config::GraphConfig {
            default_traversal_depth: 1,
            ..Default::default()
        };
        let graph = RelationshipGraph::new(store, config);
        chain(&graph, &["a", "b", "c"]).await;

        let options = graph.traversal_options();
        assert_eq!(options.max_depth, 1);
        let nodes = graph.traverse("a", options).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].chunk_id, "b");
    }

    #[tokio::test]
    async fn test_traverse_shortest_hop_wins_and_cycles_terminate() {
        let (graph, _store) = graph_with_store();
        chain(&graph, &["a", "b", "c", "a"]).await;
        chain(&graph, &["a", "c"]).await;

        let nodes = graph.traverse("a", TraversalOptions::with_depth(5)).await.unwrap();
        assert_eq!(nodes.len(), 2);
        let c = nodes.iter().find(|n| n.chunk_id == "c").unwrap();
        assert_eq!(c.depth, 1);
        assert_eq!(c.path, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_traverse_depth_ceiling() {
        let (graph, _store) = graph_with_store();
        let ids: Vec<String> = (0..15).map(|i| format!("n{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        chain(&graph, &refs).await;

        let nodes = graph.traverse("n0", TraversalOptions::with_depth(100)).await.unwrap();
        assert_eq!(nodes.len(), 10);
        assert_eq!(nodes.last().unwrap().depth, 10);
    }

    #[tokio::test]
    async fn test_traverse_filters_and_direction() {
        let (graph, store) = graph_with_store();
        graph.add_relationship("a", "b", RelationshipType::LeadsTo, RelationshipOptions::new(0.2)).await.unwrap();
        graph.add_relationship("a", "c", RelationshipType::PartOf, RelationshipOptions::new(0.8)).await.unwrap();
        graph.add_relationship("z", "a", RelationshipType::LeadsTo, RelationshipOptions::new(0.9)).await.unwrap();
        store.upsert_chunk_metadata(ChunkUpsert::new("c")).await.unwrap();

        let strong = graph
            .traverse("a", TraversalOptions { min_strength: 0.5, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].chunk_id, "c");

        let typed = graph
            .traverse(
                "a",
                TraversalOptions {
                    relationship_types: Some(vec![RelationshipType::LeadsTo]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].chunk_id, "b");

        let incoming = graph
            .traverse("a", TraversalOptions { direction: Direction::Incoming, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].chunk_id, "z");

        store.archive_chunk("c").await.unwrap();
        let active = graph.traverse("a", TraversalOptions::default()).await.unwrap();
        assert!(active.iter().all(|n| n.chunk_id != "c"));
        let all = graph
            .traverse("a", TraversalOptions { exclude_archived: false, ..Default::default() })
            .await
            .unwrap();
        assert!(all.iter().any(|n| n.chunk_id == "c"));
    }

    #[tokio::test]
    async fn test_find_clusters() {
        let (graph, store) = graph_with_store();
        for id in ["a", "b", "c", "d", "e", "f"] {
            store.upsert_chunk_metadata(ChunkUpsert::new(id)).await.unwrap();
        }
        chain(&graph, &["a", "b", "c"]).await;
        graph.add_relationship("e", "d", RelationshipType::SimilarTo, RelationshipOptions::new(0.9)).await.unwrap();

        let clusters = graph.find_clusters(1).await.unwrap();
        assert_eq!(
            clusters,
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["d".to_string(), "e".to_string()],
                vec!["f".to_string()],
            ]
        );

        let big = graph.find_clusters(3).await.unwrap();
        assert_eq!(big.len(), 1);
    }
}
