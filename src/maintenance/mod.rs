// Maintenance Module - Background upkeep of the memory substrate
//
// Components:
// - jobs: the five maintenance jobs (decay, consolidate, summarize, reindex, cleanup)
// - schedule: wall-clock fire times for the daily/weekly/monthly timers
// - scheduler: timers, the job lock and bounded run history

pub mod jobs;
pub mod schedule;
pub mod scheduler;

pub use jobs::{
    CleanupJob, ConsolidateJob, DecayJob, JobOutcome, MaintenanceJob, ReindexJob, SummarizeJob,
};
pub use schedule::Timer;
pub use scheduler::{Clock, JobHistory, MaintenanceScheduler, SchedulerStats};

use crate::error::{Result, StrataError};
use crate::types::Category;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Maintenance job kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Decay,
    Consolidate,
    Summarize,
    Reindex,
    Cleanup,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Decay,
        JobType::Consolidate,
        JobType::Summarize,
        JobType::Reindex,
        JobType::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Decay => "decay",
            JobType::Consolidate => "consolidate",
            JobType::Summarize => "summarize",
            JobType::Reindex => "reindex",
            JobType::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| StrataError::UnknownJob(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Report what would change without changing it (cleanup only)
    pub dry_run: bool,
}

/// Record of one job run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceJobResult {
    pub run_id: String,
    pub job: JobType,
    /// True when no errors were recorded, even if nothing was actionable
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
    pub errors: Vec<String>,
}

impl MaintenanceJobResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn duration_ms(&self) -> i64 {
        self.completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }
}

/// Outcome of re-evaluating one category summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryRefresh {
    /// New summary text, `None` when the current one still holds
    pub summary: Option<String>,
    pub contradiction_detected: bool,
}

/// Rewrites category summaries for the weekly job
#[async_trait]
pub trait CategorySummarizer: Send + Sync {
    async fn refresh_summary(&self, category: &Category) -> Result<SummaryRefresh>;
}
