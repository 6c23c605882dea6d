//! Hybrid scoring of externally retrieved candidates
//!
//! Candidates arrive already ranked by raw similarity. The scorer blends
//! that similarity with stored decay and importance, access recency, graph
//! proximity to seed chunks and a per-type preference. The final score is a
//! weighted sum in which the type boost contributes as a delta around 1.0.
//!
//! Scoring is read-only. Missing metadata degrades to decay 1.0, importance
//! 0.5 and recency 0 instead of failing.

mod backend;
mod tiered;

pub use backend::{RetrievalBackend, SearchOptions};
pub use tiered::{
    CategoryMatch, CategorySelection, CategorySelector, Tier, TieredOptions, TieredResult,
};

#[cfg(test)]
pub use tiered::MockCategorySelector;

use crate::config::{ScoringConfig, ScoringWeights};
use crate::error::Result;
use crate::graph::{RelationshipGraph, TraversalOptions};
use crate::storage::MetadataStore;
use crate::types::{days_between, ChunkMetadata, ChunkType, Direction, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_DECAY: f64 = 1.0;
const DEFAULT_IMPORTANCE: f64 = 0.5;

/// A retrieved chunk awaiting scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringCandidate {
    pub id: String,
    pub content: String,
    /// Raw similarity from the retrieval backend, passed through unchanged
    pub similarity: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ScoringCandidate {
    pub fn new(id: impl Into<String>, content: impl Into<String>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            similarity,
            metadata: Metadata::new(),
        }
    }
}

/// Optional query context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringContext {
    /// Chunks already known to be relevant; their graph neighbours get a boost
    pub seed_ids: Vec<String>,
    pub preferred_types: Vec<ChunkType>,
    pub include_archived: bool,
}

/// Per-signal values before weighting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub similarity: f64,
    pub decay: f64,
    pub importance: f64,
    pub recency: f64,
    pub graph_boost: f64,
    /// Multiplier around a neutral 1.0
    pub type_boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub components: ScoreComponents,
    pub chunk_type: Option<ChunkType>,
    pub metadata: Metadata,
}

/// One line of a score breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTerm {
    pub name: &'static str,
    /// Component value as it enters the sum (type boost as its delta)
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub id: String,
    pub terms: Vec<ScoreTerm>,
    pub total: f64,
}

impl fmt::Display for ScoreExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Score for {}: {:.4}", self.id, self.total)?;
        for term in &self.terms {
            writeln!(
                f,
                "  {:<12} {:>7.4} x {:.2} = {:>7.4}",
                term.name, term.value, term.weight, term.contribution
            )?;
        }
        Ok(())
    }
}

/// Weighted terms in summation order; shared by `score` and `explain_score`
fn weighted_terms(c: &ScoreComponents, w: &ScoringWeights) -> [ScoreTerm; 6] {
    let term = |name, value: f64, weight: f64| ScoreTerm {
        name,
        value,
        weight,
        contribution: value * weight,
    };
    [
        term("similarity", c.similarity, w.similarity),
        term("decay", c.decay, w.decay),
        term("importance", c.importance, w.importance),
        term("recency", c.recency, w.recency),
        term("graph_boost", c.graph_boost, w.graph_boost),
        term("type_boost", c.type_boost - 1.0, w.type_boost),
    ]
}

fn total(terms: &[ScoreTerm]) -> f64 {
    terms.iter().map(|t| t.contribution).sum()
}

/// Hybrid scorer over the metadata store and relationship graph
pub struct HybridScorer {
    store: Arc<dyn MetadataStore>,
    graph: Arc<RelationshipGraph>,
    config: ScoringConfig,
    category_selector: Option<Arc<dyn CategorySelector>>,
}

impl HybridScorer {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        graph: Arc<RelationshipGraph>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            store,
            graph,
            config,
            category_selector: None,
        }
    }

    pub fn with_category_selector(mut self, selector: Arc<dyn CategorySelector>) -> Self {
        self.category_selector = Some(selector);
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score and sort candidates, best first
    pub async fn score(
        &self,
        candidates: Vec<ScoringCandidate>,
        query: &str,
        context: &ScoringContext,
    ) -> Result<Vec<ScoredResult>> {
        self.score_at(candidates, query, context, Utc::now()).await
    }

    /// `score` with an explicit observation time
    pub async fn score_at(
        &self,
        candidates: Vec<ScoringCandidate>,
        query: &str,
        context: &ScoringContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredResult>> {
        let boosts = self.graph_boosts(&context.seed_ids).await?;
        let preferred: HashSet<ChunkType> = context.preferred_types.iter().copied().collect();
        let mut results = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let chunk = self.lookup(&candidate.id).await;
            if !context.include_archived && chunk.as_ref().map_or(false, |c| c.is_archived) {
                continue;
            }

            let chunk_type = chunk
                .as_ref()
                .map(|c| c.chunk_type)
                .or_else(|| candidate_type(&candidate.metadata));

            let components = ScoreComponents {
                similarity: candidate.similarity,
                decay: chunk.as_ref().map_or(DEFAULT_DECAY, |c| c.decay_score),
                importance: chunk.as_ref().map_or(DEFAULT_IMPORTANCE, |c| c.importance),
                recency: chunk
                    .as_ref()
                    .map_or(0.0, |c| self.recency(c, now)),
                graph_boost: boosts.get(&candidate.id).copied().unwrap_or(0.0),
                type_boost: self.type_boost(chunk_type, &preferred),
            };
            let score = total(&weighted_terms(&components, &self.config.weights));

            results.push(ScoredResult {
                id: candidate.id,
                content: candidate.content,
                score,
                components,
                chunk_type,
                metadata: candidate.metadata,
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        debug!(
            "Scored {} candidates for query '{}' ({} seeds)",
            results.len(),
            query,
            context.seed_ids.len()
        );
        Ok(results)
    }

    /// Breakdown whose total reproduces `result.score` exactly
    pub fn explain_score(&self, result: &ScoredResult) -> ScoreExplanation {
        let terms = weighted_terms(&result.components, &self.config.weights).to_vec();
        let total = total(&terms);
        ScoreExplanation {
            id: result.id.clone(),
            terms,
            total,
        }
    }

    /// 1 / (1 + days since last access / half-life), 0 if never accessed
    fn recency(&self, chunk: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
        match chunk.last_accessed_at {
            Some(at) => {
                let days = days_between(at, now).max(0.0);
                1.0 / (1.0 + days / self.config.recency_half_life_days)
            }
            None => 0.0,
        }
    }

    fn type_boost(&self, chunk_type: Option<ChunkType>, preferred: &HashSet<ChunkType>) -> f64 {
        let Some(chunk_type) = chunk_type else {
            return 1.0;
        };
        let multiplier = self
            .config
            .type_multipliers
            .get(chunk_type.as_str())
            .copied()
            .unwrap_or(1.0);
        if preferred.contains(&chunk_type) {
            multiplier * (1.0 + self.config.preferred_type_bonus)
        } else {
            multiplier
        }
    }

    /// Best strength / (1 + depth) per chunk reachable from any seed
    async fn graph_boosts(&self, seeds: &[String]) -> Result<HashMap<String, f64>> {
        let mut boosts: HashMap<String, f64> = HashMap::new();
        for seed in seeds {
            let options = TraversalOptions {
                max_depth: self.config.graph_depth,
                min_strength: self.config.graph_min_strength,
                direction: Direction::Both,
                ..self.graph.traversal_options()
            };
            for node in self.graph.traverse(seed, options).await? {
                let boost = node.strength / (1.0 + node.depth as f64);
                let entry = boosts.entry(node.chunk_id).or_insert(0.0);
                if boost > *entry {
                    *entry = boost;
                }
            }
        }
        Ok(boosts)
    }

    async fn lookup(&self, id: &str) -> Option<ChunkMetadata> {
        match self.store.get_chunk_metadata(id).await {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Scoring {} without metadata: {}", id, e);
                None
            }
        }
    }
}

/// Chunk type carried in candidate metadata, for chunks the store does not know
fn candidate_type(metadata: &Metadata) -> Option<ChunkType> {
    metadata
        .get("chunk_type")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}
