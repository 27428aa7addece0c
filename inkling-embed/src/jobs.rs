//! In-process job status store for rebuild runs.
//!
//! A rebuild job is owned by the controller task driving it; pollers only
//! ever read consistent `JobView` snapshots taken under the map lock, so a
//! reader can never observe a half-applied counter update. Jobs are kept
//! until process exit; eviction is the surrounding service's concern.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a rebuild job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable job record. Only the controller task that owns the job mutates
/// it, always through `JobTracker::update`.
#[derive(Debug, Clone)]
pub struct RebuildJob {
    pub id: String,
    pub status: JobStatus,
    pub total_items: usize,
    pub processed_items: usize,
    pub failed_items: usize,
    pub sources_processed: usize,
    pub notes_processed: usize,
    pub insights_processed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl RebuildJob {
    fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            total_items: 0,
            processed_items: 0,
            failed_items: 0,
            sources_processed: 0,
            notes_processed: 0,
            insights_processed: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    pub fn mark_running(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Running;
        }
    }

    /// Terminal success transition. A run that reached the end of its item
    /// lists completes even when some items failed; `error_message` stays
    /// empty in that case.
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Terminal failure transition, used only for pre-flight and
    /// enumeration errors. Always carries a message.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }
}

/// Read-only snapshot of a job, safe to hand to concurrent pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub total_items: usize,
    pub processed_items: usize,
    pub failed_items: usize,
    pub sources_processed: usize,
    pub notes_processed: usize,
    pub insights_processed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock seconds from job creation to its terminal transition,
    /// or to the snapshot instant while the job is still live.
    pub elapsed_seconds: f64,
    pub error_message: Option<String>,
}

impl From<&RebuildJob> for JobView {
    fn from(job: &RebuildJob) -> Self {
        let end = job.completed_at.unwrap_or_else(Utc::now);
        let elapsed_seconds = (end - job.started_at).num_milliseconds() as f64 / 1000.0;

        JobView {
            id: job.id.clone(),
            status: job.status,
            total_items: job.total_items,
            processed_items: job.processed_items,
            failed_items: job.failed_items,
            sources_processed: job.sources_processed,
            notes_processed: job.notes_processed,
            insights_processed: job.insights_processed,
            started_at: job.started_at,
            completed_at: job.completed_at,
            elapsed_seconds,
            error_message: job.error_message.clone(),
        }
    }
}

/// Shared registry of rebuild jobs, one record per accepted request.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, RebuildJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new queued job and return its id.
    pub async fn create(&self) -> String {
        let id = format!("job_{}", Uuid::new_v4());
        let mut jobs = self.jobs.write().await;
        jobs.insert(id.clone(), RebuildJob::new(id.clone()));
        id
    }

    /// Snapshot a job for polling.
    pub async fn get(&self, job_id: &str) -> Option<JobView> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(JobView::from)
    }

    /// Apply a mutation to a job under the write lock. Unknown ids are
    /// ignored; a controller only updates jobs it created.
    pub async fn update<F>(&self, job_id: &str, mutate: F)
    where
        F: FnOnce(&mut RebuildJob),
    {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            mutate(job);
        }
    }
}
