// Decay Engine
//
// Computes a [0, 1] freshness score per chunk from:
// - Age (hyperbolic half-life: exactly 0.5 at `half_life_days`)
// - Access frequency, boosted for accesses inside the recency window
// - Importance
//
// Scoring is pure; `update_all` is the only entry point that touches the store.

use crate::config::DecayConfig;
use crate::error::Result;
use crate::storage::MetadataStore;
use crate::types::{ChunkMetadata, ChunkType, DecayUpdate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of a full decay refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayUpdateResult {
    pub updated: usize,
    pub archived: usize,
    pub duration_ms: u64,
}

/// One day of a decay simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecaySimulationPoint {
    pub day: u32,
    pub access_count: u32,
    pub score: f64,
}

/// Per-factor view of a decay score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayFactors {
    pub age: f64,
    pub access: f64,
    pub importance: f64,
}

/// Decay engine
#[derive(Debug, Clone, Default)]
pub struct DecayEngine {
    config: DecayConfig,
}

impl DecayEngine {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Calculate the decay score for a chunk as observed at `now`
    ///
    /// Formula: age (30%) + access (30%) + importance (40%) with the default
    /// weights, clamped to [0, 1].
    pub fn score(&self, chunk: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
        let factors = self.factors(chunk, now);
        let w = &self.config.weights;
        let score = factors.age * w.age + factors.access * w.access + factors.importance * w.importance;
        score.clamp(0.0, 1.0)
    }

    pub fn factors(&self, chunk: &ChunkMetadata, now: DateTime<Utc>) -> DecayFactors {
        DecayFactors {
            age: self.age_factor(chunk, now),
            access: self.access_factor(chunk, now),
            importance: chunk.importance,
        }
    }

    /// Age factor: 1 / (1 + age / half_life)
    ///
    /// - Just created → 1.0
    /// - One half-life → 0.5
    /// - Three half-lives → 0.25
    fn age_factor(&self, chunk: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
        1.0 / (1.0 + chunk.age_days(now) / self.config.half_life_days)
    }

    /// Access factor: min(1, accesses / expected per month), times the recency boost
    ///
    /// The boost is `recency_boost_multiplier` for an access made at `now` and
    /// falls linearly to 1.0 at `recency_boost_days`. The boosted value may
    /// exceed 1.0; only the final score is clamped.
    fn access_factor(&self, chunk: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
        let base = (chunk.access_count as f64 / self.config.expected_accesses_per_month).min(1.0);
        base * self.recency_boost(chunk, now)
    }

    fn recency_boost(&self, chunk: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
        let window = self.config.recency_boost_days;
        match chunk.days_since_access(now) {
            Some(days) if days < window => {
                let remaining = 1.0 - days / window;
                1.0 + (self.config.recency_boost_multiplier - 1.0) * remaining
            }
            _ => 1.0,
        }
    }

    /// Score many chunks without touching them
    pub fn batch_score(&self, chunks: &[ChunkMetadata], now: DateTime<Utc>) -> Vec<DecayUpdate> {
        chunks
            .iter()
            .map(|chunk| DecayUpdate {
                id: chunk.id.clone(),
                score: self.score(chunk, now),
            })
            .collect()
    }

    /// Recompute every active chunk's score and write them back in bulk
    ///
    /// Store errors propagate unchanged; retries happen at the scheduler.
    pub async fn update_all(
        &self,
        store: &dyn MetadataStore,
        auto_archive: bool,
    ) -> Result<DecayUpdateResult> {
        let start = Instant::now();
        let now = Utc::now();

        let chunks = store.get_all_chunk_metadata(false).await?;
        let updates = self.batch_score(&chunks, now);
        debug!("Computed decay scores for {} chunks", updates.len());

        let updated = store.bulk_update_decay_scores(&updates).await?;
        let archived = if auto_archive {
            store
                .archive_stale_chunks(self.config.archival_threshold)
                .await?
        } else {
            0
        };

        let result = DecayUpdateResult {
            updated,
            archived,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Decay refresh complete: {} updated, {} archived in {}ms",
            result.updated, result.archived, result.duration_ms
        );
        Ok(result)
    }

    /// Active chunks whose stored decay score is below the threshold
    pub fn archival_candidates<'a>(
        &self,
        chunks: &'a [ChunkMetadata],
        threshold: Option<f64>,
    ) -> Vec<&'a ChunkMetadata> {
        let threshold = threshold.unwrap_or(self.config.archival_threshold);
        chunks
            .iter()
            .filter(|c| !c.is_archived && c.decay_score < threshold)
            .collect()
    }

    /// Day-by-day score trace of a synthetic chunk, for tuning
    ///
    /// `access_days` lists the day offsets on which the chunk is read; day 0
    /// is creation. Returns one point per day from 0 to `days` inclusive.
    pub fn simulate(
        &self,
        initial_importance: f64,
        access_days: &[u32],
        days: u32,
    ) -> Vec<DecaySimulationPoint> {
        let created_at = DateTime::<Utc>::UNIX_EPOCH;
        let mut chunk = ChunkMetadata {
            id: "simulated".to_string(),
            content: String::new(),
            source: String::new(),
            chunk_type: ChunkType::Documentation,
            created_at,
            updated_at: created_at,
            last_accessed_at: None,
            access_count: 0,
            importance: initial_importance.clamp(0.0, 1.0),
            decay_score: 1.0,
            is_archived: false,
        };

        (0..=days)
            .map(|day| {
                let now = created_at + Duration::days(day as i64);
                let accesses_today = access_days.iter().filter(|&&d| d == day).count() as u32;
                if accesses_today > 0 {
                    chunk.access_count += accesses_today;
                    chunk.last_accessed_at = Some(now);
                }
                let score = self.score(&chunk, now);
                chunk.decay_score = score;
                DecaySimulationPoint {
                    day,
                    access_count: chunk.access_count,
                    score,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecayWeights;
    use crate::storage::InMemoryStore;
    use crate::types::ChunkUpsert;
    use proptest::prelude::*;

    fn create_test_chunk(
        importance: f64,
        access_count: u32,
        days_old: i64,
        days_since_access: Option<i64>,
        now: DateTime<Utc>,
    ) -> ChunkMetadata {
        let mut chunk = ChunkMetadata::new("test-chunk-1", "content", ChunkType::Solution);
        chunk.importance = importance;
        chunk.access_count = access_count;
        chunk.created_at = now - Duration::days(days_old);
        chunk.last_accessed_at = days_since_access.map(|d| now - Duration::days(d));
        chunk
    }

    fn age_only_engine(half_life_days: f64) -> DecayEngine {
        DecayEngine::new(DecayConfig {
            half_life_days,
            weights: DecayWeights {
                age: 1.0,
                access: 0.0,
                importance: 0.0,
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_half_life_is_exact() {
        let engine = age_only_engine(45.0);
        let now = Utc::now();

        let fresh = create_test_chunk(0.5, 0, 0, None, now);
        let half = create_test_chunk(0.5, 0, 45, None, now);

        let fresh_score = engine.score(&fresh, now);
        let half_score = engine.score(&half, now);
        assert!((fresh_score - 1.0).abs() < 1e-12);
        assert!((half_score - fresh_score / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_reference_scenario() {
        let engine = DecayEngine::new(DecayConfig {
            half_life_days: 60.0,
            ..Default::default()
        });
        let now = Utc::now();
        let chunk = create_test_chunk(0.9, 0, 90, None, now);

        // 0.3 * (1 / 2.5) + 0.3 * 0 + 0.4 * 0.9
        let score = engine.score(&chunk, now);
        assert!((score - 0.48).abs() < 1e-9, "score was {}", score);
    }

    #[test]
    fn test_recency_boost_today_beats_window_edge() {
        let engine = DecayEngine::default();
        let now = Utc::now();

        let today = create_test_chunk(0.5, 3, 30, Some(0), now);
        let edge = create_test_chunk(0.5, 3, 30, Some(7), now);
        let never = create_test_chunk(0.5, 3, 30, None, now);

        assert!(engine.score(&today, now) > engine.score(&edge, now));
        assert_eq!(engine.score(&edge, now), engine.score(&never, now));
    }

    #[test]
    fn test_recency_boost_fades_linearly() {
        let engine = DecayEngine::default();
        let now = Utc::now();
        let mut chunk = create_test_chunk(0.5, 10, 10, Some(0), now);
        assert!((engine.recency_boost(&chunk, now) - 1.5).abs() < 1e-9);

        // Half a window later the boost is halfway back to 1.0
        chunk.last_accessed_at = Some(now - Duration::hours(84));
        assert!((engine.recency_boost(&chunk, now) - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_access_factor_saturates() {
        let engine = DecayEngine::default();
        let now = Utc::now();

        let heavy = create_test_chunk(0.5, 500, 60, Some(30), now);
        let light = create_test_chunk(0.5, 5, 60, Some(30), now);
        assert_eq!(engine.factors(&heavy, now).access, 1.0);
        assert!((engine.factors(&light, now).access - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let engine = DecayEngine::new(DecayConfig {
            weights: DecayWeights {
                age: 2.0,
                access: 2.0,
                importance: 2.0,
            },
            ..Default::default()
        });
        let now = Utc::now();
        let chunk = create_test_chunk(1.0, 50, 0, Some(0), now);
        assert_eq!(engine.score(&chunk, now), 1.0);
    }

    #[test]
    fn test_archival_candidates_skip_archived() {
        let engine = DecayEngine::default();
        let now = Utc::now();
        let mut low = create_test_chunk(0.1, 0, 400, None, now);
        low.id = "low".to_string();
        low.decay_score = 0.1;
        let mut archived = low.clone();
        archived.id = "archived".to_string();
        archived.is_archived = true;
        let mut high = low.clone();
        high.id = "high".to_string();
        high.decay_score = 0.9;

        let chunks = vec![low, archived, high];
        let candidates = engine.archival_candidates(&chunks, None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "low");

        assert_eq!(engine.archival_candidates(&chunks, Some(0.95)).len(), 2);
    }

    #[test]
    fn test_batch_score_does_not_mutate() {
        let engine = DecayEngine::default();
        let now = Utc::now();
        let chunks = vec![create_test_chunk(0.2, 0, 100, None, now)];
        let updates = engine.batch_score(&chunks, now);
        assert_eq!(updates.len(), 1);
        assert_eq!(chunks[0].decay_score, 1.0);
        assert!(updates[0].score < 1.0);
    }

    #[test]
    fn test_simulate_is_deterministic_and_reacts_to_access() {
        let engine = DecayEngine::default();
        let first = engine.simulate(0.6, &[5, 5, 20], 30);
        let second = engine.simulate(0.6, &[5, 5, 20], 30);
        assert_eq!(first, second);
        assert_eq!(first.len(), 31);

        assert_eq!(first[4].access_count, 0);
        assert_eq!(first[5].access_count, 2);
        assert_eq!(first[30].access_count, 3);
        // Access on day 5 lifts the score above the day before
        assert!(first[5].score > first[4].score);
        // Without further access the score keeps falling
        assert!(first[12].score < first[11].score);
    }

    #[tokio::test]
    async fn test_update_all_writes_scores_and_archives() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .upsert_chunk_metadata(ChunkUpsert::new("fresh").importance(0.9))
            .await
            .unwrap();
        store
            .upsert_chunk_metadata(
                ChunkUpsert::new("stale")
                    .importance(0.0)
                    .created_at(now - Duration::days(3650)),
            )
            .await
            .unwrap();

        let engine = DecayEngine::default();
        let result = engine.update_all(&store, false).await.unwrap();
        assert_eq!(result.updated, 2);
        assert_eq!(result.archived, 0);

        let stale = store.get_chunk_metadata("stale").await.unwrap().unwrap();
        assert!(stale.decay_score < 0.2);
        assert!(!stale.is_archived);

        let result = engine.update_all(&store, true).await.unwrap();
        assert_eq!(result.updated, 2);
        assert_eq!(result.archived, 1);
        let stale = store.get_chunk_metadata("stale").await.unwrap().unwrap();
        assert!(stale.is_archived);

        // Archived chunks are no longer rescored
        let result = engine.update_all(&store, true).await.unwrap();
        assert_eq!(result.updated, 1);
    }

    proptest! {
        #[test]
        fn prop_older_chunks_score_strictly_lower(
            importance in 0.0f64..=1.0,
            accesses in 0u32..40,
            younger in 0i64..2000,
            gap in 1i64..2000,
        ) {
            let engine = DecayEngine::default();
            let now = Utc::now();
            let young = create_test_chunk(importance, accesses, younger, None, now);
            let old = create_test_chunk(importance, accesses, younger + gap, None, now);
            prop_assert!(engine.score(&old, now) < engine.score(&young, now));
        }

        #[test]
        fn prop_score_stays_in_unit_interval(
            importance in 0.0f64..=1.0,
            accesses in 0u32..1000,
            days_old in 0i64..5000,
            since_access in proptest::option::of(0i64..30),
        ) {
            let engine = DecayEngine::default();
            let now = Utc::now();
            let chunk = create_test_chunk(importance, accesses, days_old, since_access, now);
            let score = engine.score(&chunk, now);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
