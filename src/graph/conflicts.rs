// Contradiction and supersession reasoning
//
// - contradicts: qualifies in either direction
// - invalidated-by: qualifies only as an outgoing edge of the queried chunk
// - supersedes: qualifies only when the queried chunk is the target

use super::RelationshipGraph;
use crate::error::Result;
use crate::types::{days_between, ChunkType, Direction, RelationshipType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

const CONTRADICTION_SIMILARITY: f64 = 0.85;
const IGNORE_BELOW_SIMILARITY: f64 = 0.9;
const MERGE_SIMILARITY: f64 = 0.95;
const SUPERSEDE_AFTER_DAYS: f64 = 30.0;
const MERGE_WITHIN_DAYS: f64 = 1.0;

/// How a conflicting chunk relates to the queried one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Contradicts,
    InvalidatedBy,
    /// The queried chunk has been replaced by this one
    SupersededBy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub chunk_id: String,
    pub kind: ConflictKind,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

/// An existing chunk compared against a newly ingested one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionCandidate {
    pub chunk_id: String,
    pub chunk_type: ChunkType,
    pub created_at: DateTime<Utc>,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionAction {
    Supersede,
    Merge,
    Ignore,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionSuggestion {
    pub existing_id: String,
    pub similarity: f64,
    pub days_apart: f64,
    pub action: ContradictionAction,
}

impl RelationshipGraph {
    /// Chunks in conflict with `id`
    pub async fn find_contradictions(&self, id: &str) -> Result<Vec<Contradiction>> {
        let mut seen: HashSet<(String, ConflictKind)> = HashSet::new();
        let mut found = Vec::new();

        for edge in self.store.get_relationships(id, Direction::Both).await? {
            let outgoing = edge.from_chunk_id == id;
            let kind = match edge.relationship_type {
                RelationshipType::Contradicts => ConflictKind::Contradicts,
                RelationshipType::InvalidatedBy if outgoing => ConflictKind::InvalidatedBy,
                RelationshipType::Supersedes if !outgoing => ConflictKind::SupersededBy,
                _ => continue,
            };

            let other = edge.other_end(id).to_string();
            if other == id || !seen.insert((other.clone(), kind)) {
                continue;
            }
            found.push(Contradiction {
                chunk_id: other,
                kind,
                relationship_type: edge.relationship_type,
                strength: edge.strength,
            });
        }

        Ok(found)
    }

    /// Classify similar existing chunks against a newly ingested one
    ///
    /// Only prescriptive types (solution, decision, pattern, standard) on
    /// both sides are considered, and only at similarity >= 0.85.
    pub fn detect_potential_contradictions(
        &self,
        new_id: &str,
        new_type: ChunkType,
        new_created_at: DateTime<Utc>,
        candidates: &[ContradictionCandidate],
    ) -> Vec<ContradictionSuggestion> {
        if !new_type.is_prescriptive() {
            return Vec::new();
        }

        candidates
            .iter()
            .filter(|c| c.chunk_id != new_id && c.chunk_type.is_prescriptive())
            .filter(|c| c.similarity >= CONTRADICTION_SIMILARITY)
            .map(|c| {
                let days_apart = days_between(c.created_at, new_created_at).abs();
                let action = if days_apart > SUPERSEDE_AFTER_DAYS {
                    ContradictionAction::Supersede
                } else if days_apart < MERGE_WITHIN_DAYS && c.similarity > MERGE_SIMILARITY {
                    ContradictionAction::Merge
                } else if c.similarity < IGNORE_BELOW_SIMILARITY {
                    ContradictionAction::Ignore
                } else {
                    ContradictionAction::Review
                };
                ContradictionSuggestion {
                    existing_id: c.chunk_id.clone(),
                    similarity: c.similarity,
                    days_apart,
                    action,
                }
            })
            .collect()
    }

    /// Successors of `id`, oldest first, following inbound supersedes edges
    ///
    /// When a chunk has several successors the strongest (then newest) edge
    /// is followed.
    pub async fn find_supersession_chain(&self, id: &str) -> Result<Vec<String>> {
        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut chain = Vec::new();
        let mut current = id.to_string();

        loop {
            let successor = self
                .store
                .get_relationships(&current, Direction::Incoming)
                .await?
                .into_iter()
                .filter(|e| e.relationship_type == RelationshipType::Supersedes)
                .filter(|e| !visited.contains(&e.from_chunk_id))
                .max_by(|a, b| {
                    a.strength
                        .total_cmp(&b.strength)
                        .then_with(|| a.created_at.cmp(&b.created_at))
                });

            match successor {
                Some(edge) => {
                    visited.insert(edge.from_chunk_id.clone());
                    chain.push(edge.from_chunk_id.clone());
                    current = edge.from_chunk_id;
                }
                None => break,
            }
        }

        debug!("Supersession chain for {}: {:?}", id, chain);
        Ok(chain)
    }

    /// Newest version of `id`, or `id` itself when nothing supersedes it
    pub async fn get_latest_version(&self, id: &str) -> Result<String> {
        Ok(self
            .find_supersession_chain(id)
            .await?
            .pop()
            .unwrap_or_else(|| id.to_string()))
    }
}
