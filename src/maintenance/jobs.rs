// Maintenance jobs
//
// A job never returns an error: store and collaborator failures are recorded
// on its outcome. Multi-step jobs (consolidate, reindex) record a failing step
// and continue with the remaining steps.

use super::{CategorySummarizer, JobOptions, JobType};
use crate::config::MaintenanceConfig;
use crate::decay::DecayEngine;
use crate::error::Result;
use crate::graph::RelationshipGraph;
use crate::storage::MetadataStore;
use crate::types::{ChunkMetadata, ChunkUpsert};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metrics and errors collected during one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutcome {
    pub metrics: BTreeMap<String, f64>,
    pub errors: Vec<String>,
}

impl JobOutcome {
    pub fn metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
    }

    pub fn record_error(&mut self, step: &str, error: impl std::fmt::Display) {
        warn!("Maintenance step {} failed: {}", step, error);
        self.errors.push(format!("{}: {}", step, error));
    }

    /// Run one step, recording its error instead of propagating it
    fn step<T>(&mut self, name: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.record_error(name, e);
                None
            }
        }
    }
}

/// A maintenance job the scheduler can run
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn run(&self, options: &JobOptions) -> JobOutcome;
}

/// Hourly decay refresh, no archival
pub struct DecayJob {
    store: Arc<dyn MetadataStore>,
    decay: Arc<DecayEngine>,
}

impl DecayJob {
    pub fn new(store: Arc<dyn MetadataStore>, decay: Arc<DecayEngine>) -> Self {
        Self { store, decay }
    }
}

#[async_trait]
impl MaintenanceJob for DecayJob {
    fn job_type(&self) -> JobType {
        JobType::Decay
    }

    async fn run(&self, _options: &JobOptions) -> JobOutcome {
        let mut outcome = JobOutcome::default();
        let result = self.decay.update_all(self.store.as_ref(), false).await;
        if let Some(update) = outcome.step("decay", result) {
            outcome.metric("updated", update.updated as f64);
            outcome.metric("duration_ms", update.duration_ms as f64);
        }
        outcome
    }
}

/// Nightly consolidation
///
/// Steps: decay refresh, duplicate folding, importance boost for recently
/// read chunks, archival below the stricter consolidation threshold.
pub struct ConsolidateJob {
    store: Arc<dyn MetadataStore>,
    decay: Arc<DecayEngine>,
    graph: Arc<RelationshipGraph>,
    config: MaintenanceConfig,
}

impl ConsolidateJob {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        decay: Arc<DecayEngine>,
        graph: Arc<RelationshipGraph>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            store,
            decay,
            graph,
            config,
        }
    }

    /// Archive all but one chunk per duplicate group; returns (groups, archived)
    ///
    /// The supersedes edge is written before the duplicate is archived, so a
    /// failure never leaves an archived duplicate without a link to its
    /// primary. A failing duplicate is recorded and the rest proceed.
    async fn fold_duplicates(&self, outcome: &mut JobOutcome) -> Result<(usize, usize)> {
        let chunks = self.store.get_all_chunk_metadata(false).await?;
        let groups = duplicate_groups(chunks, self.config.duplicate_window);

        let mut archived = 0;
        for group in &groups {
            let Some(primary) = pick_primary(group) else {
                continue;
            };
            for duplicate in group.iter().filter(|c| c.id != primary.id) {
                let linked = self.graph.mark_supersedes(&primary.id, &duplicate.id).await;
                if outcome.step("duplicates", linked).is_none() {
                    continue;
                }
                let result = self.store.archive_chunk(&duplicate.id).await;
                if let Some(true) = outcome.step("duplicates", result) {
                    archived += 1;
                    debug!("Folded duplicate {} into {}", duplicate.id, primary.id);
                }
            }
        }
        Ok((groups.len(), archived))
    }

    /// Raise importance of chunks read inside the recent-access window
    async fn boost_recent(&self) -> Result<usize> {
        let window = Duration::from_std(self.config.recent_access_window)
            .unwrap_or_else(|_| Duration::hours(24));
        let since = Utc::now() - window;

        let mut boosted = 0;
        for stats in self.store.get_access_stats(since).await? {
            let Some(chunk) = self.store.get_chunk_metadata(&stats.chunk_id).await? else {
                continue;
            };
            let importance = (chunk.importance + self.config.importance_boost).min(1.0);
            if importance > chunk.importance {
                self.store
                    .upsert_chunk_metadata(ChunkUpsert::new(&chunk.id).importance(importance))
                    .await?;
                boosted += 1;
            }
        }
        Ok(boosted)
    }
}

/// Groups of two or more chunks created within `window` of the group's first chunk
fn duplicate_groups(
    mut chunks: Vec<ChunkMetadata>,
    window: std::time::Duration,
) -> Vec<Vec<ChunkMetadata>> {
    let window = Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60));
    chunks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut groups: Vec<Vec<ChunkMetadata>> = Vec::new();
    let mut current: Vec<ChunkMetadata> = Vec::new();
    for chunk in chunks {
        let same_window = current
            .first()
            .map_or(false, |first| chunk.created_at - first.created_at <= window);
        if !same_window {
            if current.len() > 1 {
                groups.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
        current.push(chunk);
    }
    if current.len() > 1 {
        groups.push(current);
    }
    groups
}

/// Most important chunk, then most read, then oldest
fn pick_primary(group: &[ChunkMetadata]) -> Option<&ChunkMetadata> {
    group.iter().max_by(|a, b| {
        a.importance
            .total_cmp(&b.importance)
            .then_with(|| a.access_count.cmp(&b.access_count))
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    })
}

#[async_trait]
impl MaintenanceJob for ConsolidateJob {
    fn job_type(&self) -> JobType {
        JobType::Consolidate
    }

    async fn run(&self, _options: &JobOptions) -> JobOutcome {
        let mut outcome = JobOutcome::default();

        let result = self.decay.update_all(self.store.as_ref(), false).await;
        if let Some(update) = outcome.step("decay", result) {
            outcome.metric("decay_updated", update.updated as f64);
        }

        let result = self.fold_duplicates(&mut outcome).await;
        if let Some((groups, archived)) = outcome.step("duplicates", result) {
            outcome.metric("duplicate_groups", groups as f64);
            outcome.metric("duplicates_archived", archived as f64);
        }

        let result = self.boost_recent().await;
        if let Some(boosted) = outcome.step("importance_boost", result) {
            outcome.metric("importance_boosted", boosted as f64);
        }

        let result = self
            .store
            .archive_stale_chunks(self.config.consolidation_archive_threshold)
            .await;
        if let Some(archived) = outcome.step("archive", result) {
            outcome.metric("low_decay_archived", archived as f64);
        }

        outcome
    }
}

/// Weekly category summary refresh
pub struct SummarizeJob {
    store: Arc<dyn MetadataStore>,
    summarizer: Option<Arc<dyn CategorySummarizer>>,
}

impl SummarizeJob {
    pub fn new(store: Arc<dyn MetadataStore>, summarizer: Option<Arc<dyn CategorySummarizer>>) -> Self {
        Self { store, summarizer }
    }
}

#[async_trait]
impl MaintenanceJob for SummarizeJob {
    fn job_type(&self) -> JobType {
        JobType::Summarize
    }

    async fn run(&self, _options: &JobOptions) -> JobOutcome {
        let mut outcome = JobOutcome::default();
        let Some(summarizer) = &self.summarizer else {
            info!("No category summarizer configured, skipping summaries");
            outcome.metric("categories", 0.0);
            return outcome;
        };

        let result = self.store.list_categories().await;
        let Some(categories) = outcome.step("list_categories", result) else {
            return outcome;
        };

        let mut updated = 0;
        let mut contradictions = 0;
        for category in &categories {
            let step = format!("category {}", category.name);
            let result = summarizer.refresh_summary(category).await;
            let Some(refresh) = outcome.step(&step, result) else {
                continue;
            };
            if refresh.contradiction_detected {
                contradictions += 1;
            }
            match refresh.summary {
                Some(summary) if summary != category.summary => {
                    let mut next = category.clone();
                    next.summary = summary;
                    next.updated_at = Utc::now();
                    if outcome
                        .step(&step, self.store.upsert_category(&next).await)
                        .is_some()
                    {
                        updated += 1;
                    }
                }
                _ => {}
            }
        }

        outcome.metric("categories", categories.len() as f64);
        outcome.metric("summaries_updated", updated as f64);
        outcome.metric("contradictions_detected", contradictions as f64);
        outcome
    }
}

/// Monthly reindex
///
/// Relationship edges are left in place; only chunk rows are archived.
pub struct ReindexJob {
    store: Arc<dyn MetadataStore>,
    graph: Arc<RelationshipGraph>,
    config: MaintenanceConfig,
}

impl ReindexJob {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        graph: Arc<RelationshipGraph>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            store,
            graph,
            config,
        }
    }

    /// Archive never-read chunks older than the stale age
    async fn archive_stale(&self) -> Result<usize> {
        let now = Utc::now();
        let mut archived = 0;
        for chunk in self.store.get_all_chunk_metadata(false).await? {
            if chunk.access_count == 0
                && chunk.age_days(now) > self.config.stale_age_days
                && self.store.archive_chunk(&chunk.id).await?
            {
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[async_trait]
impl MaintenanceJob for ReindexJob {
    fn job_type(&self) -> JobType {
        JobType::Reindex
    }

    async fn run(&self, _options: &JobOptions) -> JobOutcome {
        let mut outcome = JobOutcome::default();

        let result = self.graph.get_stats().await;
        if let Some(stats) = outcome.step("graph_stats", result) {
            outcome.metric("total_chunks", stats.total_chunks as f64);
            outcome.metric("total_relationships", stats.total_relationships as f64);
            outcome.metric("isolated_chunks", stats.isolated_chunks as f64);
            outcome.metric("approx_max_depth", stats.approx_max_depth as f64);
        }

        let result = self.archive_stale().await;
        if let Some(archived) = outcome.step("archive_stale", result) {
            outcome.metric("stale_archived", archived as f64);
        }

        if outcome.step("vacuum", self.store.vacuum().await).is_some() {
            outcome.metric("vacuumed", 1.0);
        }

        outcome
    }
}

/// Permanent deletion of archived chunks; the only job with a dry run
pub struct CleanupJob {
    store: Arc<dyn MetadataStore>,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MaintenanceJob for CleanupJob {
    fn job_type(&self) -> JobType {
        JobType::Cleanup
    }

    async fn run(&self, options: &JobOptions) -> JobOutcome {
        let mut outcome = JobOutcome::default();

        let result = self.store.get_all_chunk_metadata(true).await;
        let Some(chunks) = outcome.step("list_archived", result) else {
            return outcome;
        };
        let archived: Vec<ChunkMetadata> = chunks.into_iter().filter(|c| c.is_archived).collect();
        outcome.metric("archived_chunks", archived.len() as f64);

        if options.dry_run {
            info!("Cleanup dry run: {} archived chunks would be deleted", archived.len());
            outcome.metric("deleted", 0.0);
            outcome.metric("dry_run", 1.0);
            return outcome;
        }

        let mut deleted = 0;
        for chunk in &archived {
            let result = self.store.delete_chunk_metadata(&chunk.id).await;
            if let Some(true) = outcome.step("delete", result) {
                deleted += 1;
            }
        }
        outcome.metric("deleted", deleted as f64);

        if deleted > 0 {
            outcome.step("vacuum", self.store.vacuum().await);
        }
        outcome
    }
}
