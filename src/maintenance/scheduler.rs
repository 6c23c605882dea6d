// Maintenance Scheduler
//
// One interval timer drives the decay job; three one-shot timers (daily,
// weekly, monthly) re-arm themselves after each run. Every run, timed or
// manual, goes through a single job lock, so jobs never overlap against the
// same store. `stop` cancels pending timers but lets an in-flight job finish.

use super::jobs::{
    CleanupJob, ConsolidateJob, DecayJob, JobOutcome, MaintenanceJob, ReindexJob, SummarizeJob,
};
use super::schedule::Timer;
use super::{CategorySummarizer, JobOptions, JobType, MaintenanceJobResult};
use crate::config::MaintenanceConfig;
use crate::decay::DecayEngine;
use crate::error::{Result, StrataError};
use crate::graph::RelationshipGraph;
use crate::storage::MetadataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wall-clock source for the calendar timers
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Floor for the decay timer period; a zero period cannot drive a ticker
const MIN_DECAY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Bounded run history, oldest entries evicted first
#[derive(Debug, Clone)]
pub struct JobHistory {
    entries: VecDeque<MaintenanceJobResult>,
    capacity: usize,
}

impl JobHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, result: MaintenanceJobResult) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<MaintenanceJobResult> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn last_for(&self, job: JobType) -> Option<&MaintenanceJobResult> {
        self.entries.iter().rev().find(|r| r.job == job)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshot returned by `MaintenanceScheduler::stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub total_runs: u64,
    pub total_failures: u64,
    pub last_results: BTreeMap<JobType, MaintenanceJobResult>,
    pub next_runs: BTreeMap<JobType, DateTime<Utc>>,
}

/// Background maintenance scheduler
pub struct MaintenanceScheduler {
    config: MaintenanceConfig,
    jobs: BTreeMap<JobType, Arc<dyn MaintenanceJob>>,
    job_lock: Mutex<()>,
    history: Mutex<JobHistory>,
    next_runs: Mutex<BTreeMap<JobType, DateTime<Utc>>>,
    timers: Mutex<Option<(CancellationToken, Vec<JoinHandle<()>>)>>,
    running: AtomicBool,
    total_runs: AtomicU64,
    total_failures: AtomicU64,
    clock: Clock,
}

impl MaintenanceScheduler {
    /// Scheduler with the five standard jobs over the given components
    pub fn new(
        store: Arc<dyn MetadataStore>,
        decay: Arc<DecayEngine>,
        graph: Arc<RelationshipGraph>,
        config: MaintenanceConfig,
    ) -> Self {
        let mut scheduler = Self::empty(config.clone());
        scheduler.register_job(Arc::new(DecayJob::new(store.clone(), decay.clone())));
        scheduler.register_job(Arc::new(ConsolidateJob::new(
            store.clone(),
            decay,
            graph.clone(),
            config.clone(),
        )));
        scheduler.register_job(Arc::new(SummarizeJob::new(store.clone(), None)));
        scheduler.register_job(Arc::new(ReindexJob::new(store.clone(), graph, config)));
        scheduler.register_job(Arc::new(CleanupJob::new(store)));
        scheduler
    }

    /// Scheduler with no jobs registered
    pub fn empty(config: MaintenanceConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            jobs: BTreeMap::new(),
            job_lock: Mutex::new(()),
            history: Mutex::new(JobHistory::new(capacity)),
            next_runs: Mutex::new(BTreeMap::new()),
            timers: Mutex::new(None),
            running: AtomicBool::new(false),
            total_runs: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            clock: Arc::new(Utc::now),
        }
    }

    /// Register a job, replacing any job of the same type
    pub fn register_job(&mut self, job: Arc<dyn MaintenanceJob>) {
        self.jobs.insert(job.job_type(), job);
    }

    /// Use `summarizer` for the weekly summary job
    pub fn with_summarizer(
        mut self,
        store: Arc<dyn MetadataStore>,
        summarizer: Arc<dyn CategorySummarizer>,
    ) -> Self {
        self.register_job(Arc::new(SummarizeJob::new(store, Some(summarizer))));
        self
    }

    /// Replace the wall clock used to compute timer fire times
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Arm all timers; calling it on a running scheduler is a no-op
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Maintenance scheduler is already running");
            return;
        }

        tracing::info!("Starting maintenance scheduler");
        let token = CancellationToken::new();
        let mut handles = Vec::with_capacity(4);

        let this = Arc::clone(self);
        let cancel = token.clone();
        handles.push(tokio::spawn(async move {
            this.run_interval_timer(cancel).await;
        }));

        for timer in Timer::ALL {
            let this = Arc::clone(self);
            let cancel = token.clone();
            handles.push(tokio::spawn(async move {
                this.run_calendar_timer(timer, cancel).await;
            }));
        }

        *self.timers.lock().await = Some((token, handles));
    }

    /// Cancel pending timers; a job already running completes
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some((token, _handles)) = self.timers.lock().await.take() {
            token.cancel();
        }
        // Timers check the token under this lock before re-arming
        self.next_runs.lock().await.clear();
        tracing::info!("Stopped maintenance scheduler");
    }

    /// Publish the next fire time unless the timer was cancelled meanwhile
    async fn arm(&self, job: JobType, at: DateTime<Utc>, cancel: &CancellationToken) -> bool {
        let mut next_runs = self.next_runs.lock().await;
        if cancel.is_cancelled() {
            return false;
        }
        next_runs.insert(job, at);
        true
    }

    async fn run_interval_timer(&self, cancel: CancellationToken) {
        let period = self.config.decay_interval.max(MIN_DECAY_INTERVAL);
        if period != self.config.decay_interval {
            tracing::warn!("Decay interval {:?} raised to {:?}", self.config.decay_interval, period);
        }
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let delta = chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::hours(1));

        loop {
            if !self.arm(JobType::Decay, (self.clock)() + delta, &cancel).await {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_timed(JobType::Decay).await;
        }
        tracing::debug!("Decay timer cancelled");
    }

    async fn run_calendar_timer(&self, timer: Timer, cancel: CancellationToken) {
        let job = timer.job();
        loop {
            let now = (self.clock)();
            let Some(next) = timer.next_fire(now, &self.config) else {
                tracing::error!("Could not compute next {:?} fire time, timer disarmed", timer);
                break;
            };
            if !self.arm(job, next, &cancel).await {
                break;
            }
            let wait = next.signed_duration_since(now).to_std().unwrap_or_default();
            tracing::debug!("{} job armed for {} (in {:?})", job, next, wait);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            self.run_timed(job).await;
        }
        tracing::debug!("{:?} timer cancelled", timer);
    }

    /// Timer entry point: failures are logged and never disarm the timer
    async fn run_timed(&self, job: JobType) {
        if let Err(e) = self.run_job(job, JobOptions::default()).await {
            tracing::error!("Scheduled {} job could not run: {}", job, e);
        }
    }

    /// Run a job now, waiting for any in-flight job first
    pub async fn run_job(&self, job_type: JobType, options: JobOptions) -> Result<MaintenanceJobResult> {
        let job = self
            .jobs
            .get(&job_type)
            .cloned()
            .ok_or_else(|| StrataError::UnknownJob(job_type.to_string()))?;

        let _guard = self.job_lock.lock().await;
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!("Starting {} job (id: {})", job_type, run_id);

        let JobOutcome { metrics, errors } = job.run(&options).await;
        let result = MaintenanceJobResult {
            run_id,
            job: job_type,
            success: errors.is_empty(),
            started_at,
            completed_at: Utc::now(),
            metrics,
            errors,
        };

        self.total_runs.fetch_add(1, Ordering::SeqCst);
        if result.success {
            tracing::info!(
                "Job {} completed successfully in {}ms: {:?}",
                job_type,
                result.duration_ms(),
                result.metrics
            );
        } else {
            self.total_failures.fetch_add(1, Ordering::SeqCst);
            tracing::error!(
                "Job {} finished with {} error(s): {}",
                job_type,
                result.errors.len(),
                result.errors.join("; ")
            );
        }

        self.history.lock().await.push(result.clone());
        Ok(result)
    }

    /// Run a job by name; unknown names fail before anything runs
    pub async fn run_job_named(&self, name: &str, options: JobOptions) -> Result<MaintenanceJobResult> {
        let job_type: JobType = name.parse()?;
        self.run_job(job_type, options).await
    }

    /// Most recent results, newest first
    pub async fn history(&self, limit: usize) -> Vec<MaintenanceJobResult> {
        self.history.lock().await.recent(limit)
    }

    pub async fn stats(&self) -> SchedulerStats {
        let history = self.history.lock().await;
        let last_results = JobType::ALL
            .iter()
            .filter_map(|job| history.last_for(*job).map(|r| (*job, r.clone())))
            .collect();

        SchedulerStats {
            running: self.is_running(),
            total_runs: self.total_runs.load(Ordering::SeqCst),
            total_failures: self.total_failures.load(Ordering::SeqCst),
            last_results,
            next_runs: self.next_runs.lock().await.clone(),
        }
    }
}
