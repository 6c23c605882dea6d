//! Core data types for the Strata memory substrate
//!
//! Chunks, relationship edges, categories and the small value types the
//! components exchange. Chunks and edges refer to each other only by id, so
//! the graph is an index over the metadata store rather than a web of
//! in-memory references.

use crate::error::StrataError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Free-form metadata attached to relationships and scoring candidates
pub type Metadata = serde_json::Map<String, serde_json::Value>;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Fractional days elapsed from `from` to `to` (negative if `to` is earlier)
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    to.signed_duration_since(from).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Chunk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkType {
    Documentation,
    Code,
    Solution,
    Pattern,
    Decision,
    Standard,
    Preference,
    CategorySummary,
}

impl ChunkType {
    pub const ALL: [ChunkType; 8] = [
        ChunkType::Documentation,
        ChunkType::Code,
        ChunkType::Solution,
        ChunkType::Pattern,
        ChunkType::Decision,
        ChunkType::Standard,
        ChunkType::Preference,
        ChunkType::CategorySummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Documentation => "documentation",
            ChunkType::Code => "code",
            ChunkType::Solution => "solution",
            ChunkType::Pattern => "pattern",
            ChunkType::Decision => "decision",
            ChunkType::Standard => "standard",
            ChunkType::Preference => "preference",
            ChunkType::CategorySummary => "category-summary",
        }
    }

    /// Types that carry prescriptive knowledge and can therefore conflict
    pub fn is_prescriptive(&self) -> bool {
        matches!(
            self,
            ChunkType::Solution | ChunkType::Decision | ChunkType::Pattern | ChunkType::Standard
        )
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ChunkType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| StrataError::UnknownChunkType(s.to_string()))
    }
}

/// Stored metadata for a single chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Stable opaque identifier, immutable after creation
    pub id: String,
    pub content: String,
    pub source: String,
    pub chunk_type: ChunkType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u32,
    /// Importance in [0, 1]
    pub importance: f64,
    /// Decay score in [0, 1]; written only by the decay engine
    pub decay_score: f64,
    /// Written only by the decay engine and archival routines
    pub is_archived: bool,
}

impl ChunkMetadata {
    /// Fresh chunk as written at ingestion time
    pub fn new(id: impl Into<String>, content: impl Into<String>, chunk_type: ChunkType) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            content: content.into(),
            source: String::new(),
            chunk_type,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            importance: 0.5,
            decay_score: 1.0,
            is_archived: false,
        }
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        days_between(self.created_at, now).max(0.0)
    }

    pub fn days_since_access(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_accessed_at
            .map(|at| days_between(at, now).max(0.0))
    }
}

/// Partial write for `upsert_chunk_metadata`
///
/// Fields left as `None` keep their stored value (or the ingestion default
/// for a new chunk). Decay score and archival flag are deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkUpsert {
    pub id: String,
    pub content: Option<String>,
    pub source: Option<String>,
    pub chunk_type: Option<ChunkType>,
    pub importance: Option<f64>,
    pub access_count: Option<u32>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ChunkUpsert {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = Some(chunk_type);
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn access_count(mut self, access_count: u32) -> Self {
        self.access_count = Some(access_count);
        self
    }

    pub fn last_accessed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed_at = Some(at);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Merge this write over an existing record, or build a new one
    pub fn apply(self, existing: Option<ChunkMetadata>, now: DateTime<Utc>) -> ChunkMetadata {
        let mut chunk = existing.unwrap_or_else(|| ChunkMetadata {
            id: self.id.clone(),
            content: String::new(),
            source: String::new(),
            chunk_type: ChunkType::Documentation,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            importance: 0.5,
            decay_score: 1.0,
            is_archived: false,
        });

        if let Some(content) = self.content {
            chunk.content = content;
        }
        if let Some(source) = self.source {
            chunk.source = source;
        }
        if let Some(chunk_type) = self.chunk_type {
            chunk.chunk_type = chunk_type;
        }
        if let Some(importance) = self.importance {
            chunk.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(count) = self.access_count {
            chunk.access_count = count;
        }
        if let Some(at) = self.last_accessed_at {
            chunk.last_accessed_at = Some(at);
        }
        if let Some(at) = self.created_at {
            chunk.created_at = at;
        }
        chunk.updated_at = now;
        chunk
    }
}

/// One entry of a bulk decay write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayUpdate {
    pub id: String,
    pub score: f64,
}

/// Access activity for a chunk since some point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessStats {
    pub chunk_id: String,
    pub access_count: u32,
    pub last_accessed_at: DateTime<Utc>,
}

/// Relationship type groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipCategory {
    Semantic,
    Causal,
    Temporal,
    Conflict,
    Preference,
    Structural,
}

/// Typed edge between two chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    // Semantic
    RelatesTo,
    SimilarTo,
    Elaborates,
    ExampleOf,
    // Causal
    LeadsTo,
    DerivesFrom,
    Solves,
    Enables,
    // Temporal
    Supersedes,
    Precedes,
    Follows,
    Updates,
    // Conflict
    Contradicts,
    InvalidatedBy,
    Invalidates,
    // Preference
    PreferredOver,
    AlternativeTo,
    // Structural
    PartOf,
    Contains,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 19] = [
        RelationshipType::RelatesTo,
        RelationshipType::SimilarTo,
        RelationshipType::Elaborates,
        RelationshipType::ExampleOf,
        RelationshipType::LeadsTo,
        RelationshipType::DerivesFrom,
        RelationshipType::Solves,
        RelationshipType::Enables,
        RelationshipType::Supersedes,
        RelationshipType::Precedes,
        RelationshipType::Follows,
        RelationshipType::Updates,
        RelationshipType::Contradicts,
        RelationshipType::InvalidatedBy,
        RelationshipType::Invalidates,
        RelationshipType::PreferredOver,
        RelationshipType::AlternativeTo,
        RelationshipType::PartOf,
        RelationshipType::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::RelatesTo => "relates-to",
            RelationshipType::SimilarTo => "similar-to",
            RelationshipType::Elaborates => "elaborates",
            RelationshipType::ExampleOf => "example-of",
            RelationshipType::LeadsTo => "leads-to",
            RelationshipType::DerivesFrom => "derives-from",
            RelationshipType::Solves => "solves",
            RelationshipType::Enables => "enables",
            RelationshipType::Supersedes => "supersedes",
            RelationshipType::Precedes => "precedes",
            RelationshipType::Follows => "follows",
            RelationshipType::Updates => "updates",
            RelationshipType::Contradicts => "contradicts",
            RelationshipType::InvalidatedBy => "invalidated-by",
            RelationshipType::Invalidates => "invalidates",
            RelationshipType::PreferredOver => "preferred-over",
            RelationshipType::AlternativeTo => "alternative-to",
            RelationshipType::PartOf => "part-of",
            RelationshipType::Contains => "contains",
        }
    }

    pub fn category(&self) -> RelationshipCategory {
        use RelationshipType::*;
        match self {
            RelatesTo | SimilarTo | Elaborates | ExampleOf => RelationshipCategory::Semantic,
            LeadsTo | DerivesFrom | Solves | Enables => RelationshipCategory::Causal,
            Supersedes | Precedes | Follows | Updates => RelationshipCategory::Temporal,
            Contradicts | InvalidatedBy | Invalidates => RelationshipCategory::Conflict,
            PreferredOver | AlternativeTo => RelationshipCategory::Preference,
            PartOf | Contains => RelationshipCategory::Structural,
        }
    }

    /// Whether creating this edge implies the mirror edge
    pub fn is_bidirectional(&self) -> bool {
        matches!(
            self,
            RelationshipType::RelatesTo
                | RelationshipType::SimilarTo
                | RelationshipType::Contradicts
                | RelationshipType::AlternativeTo
        )
    }

    /// Type of the edge read from the other endpoint
    pub fn reverse(&self) -> RelationshipType {
        use RelationshipType::*;
        match self {
            RelatesTo => RelatesTo,
            SimilarTo => SimilarTo,
            Elaborates | ExampleOf => RelatesTo,
            LeadsTo => DerivesFrom,
            DerivesFrom => LeadsTo,
            Solves | Enables => DerivesFrom,
            Supersedes | Updates => Precedes,
            Precedes => Follows,
            Follows => Precedes,
            Contradicts => Contradicts,
            InvalidatedBy => Invalidates,
            Invalidates => InvalidatedBy,
            PreferredOver => AlternativeTo,
            AlternativeTo => AlternativeTo,
            PartOf => Contains,
            Contains => PartOf,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| StrataError::UnknownRelationshipType(s.to_string()))
    }
}

/// Directed typed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_chunk_id: String,
    pub to_chunk_id: String,
    pub relationship_type: RelationshipType,
    /// Strength in [0, 1]
    pub strength: f64,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relationship_type: RelationshipType,
        strength: f64,
    ) -> Self {
        Self {
            from_chunk_id: from.into(),
            to_chunk_id: to.into(),
            relationship_type,
            strength,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// The endpoint that is not `id` (the target when `id` is neither)
    pub fn other_end(&self, id: &str) -> &str {
        if self.from_chunk_id == id {
            &self.to_chunk_id
        } else {
            &self.from_chunk_id
        }
    }

    pub fn key(&self) -> (&str, &str, RelationshipType) {
        (&self.from_chunk_id, &self.to_chunk_id, self.relationship_type)
    }
}

/// Which edges of a chunk to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// Rolling summary maintained per knowledge category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub summary: String,
    pub item_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>, summary: impl Into<String>, item_count: usize) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            item_count,
            updated_at: Utc::now(),
        }
    }
}
