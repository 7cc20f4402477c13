//! Background crawl jobs
//!
//! [`JobTracker`] triggers crawls without blocking the caller. Each job runs
//! on its own tokio task with its own cancellation token, derived from the
//! tracker's token so that shutting the tracker down stops every job.

use crate::crawler::orchestrator::{CrawlOrchestrator, CrawlReport};
use crate::{FetchError, PresaleError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tracker-local job identifier
pub type JobId = u64;

/// Observable state of a background job
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Running,
    /// The crawl reached `Done` or `Cancelled`
    Finished(CrawlReport),
    /// The crawl failed; carries the error message
    Failed(String),
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

struct JobEntry {
    property_id: String,
    status: watch::Receiver<JobStatus>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Spawns crawl jobs and reports on them
#[derive(Clone)]
pub struct JobTracker {
    orchestrator: Arc<CrawlOrchestrator>,
    jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
    next_id: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl JobTracker {
    pub fn new(orchestrator: Arc<CrawlOrchestrator>) -> Self {
        Self {
            orchestrator,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        // Entries stay consistent even if a holder panicked
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a crawl in the background and returns its id immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, property_id: &str) -> Result<JobId, PresaleError> {
        let property_id = property_id.trim().to_string();
        if property_id.is_empty() {
            return Err(FetchError::UnresolvedProperty.into());
        }
        if self.shutdown.is_cancelled() {
            return Err(FetchError::Cancelled.into());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let (tx, rx) = watch::channel(JobStatus::Running);

        let orchestrator = Arc::clone(&self.orchestrator);
        let token = cancel.clone();
        let pid = property_id.clone();
        let handle = tokio::spawn(async move {
            let status = match orchestrator.run(&pid, &token).await {
                Ok(report) => JobStatus::Finished(report),
                Err(e) => {
                    tracing::error!("Crawl job for property {} failed: {}", pid, e);
                    JobStatus::Failed(e.to_string())
                }
            };
            tx.send_replace(status);
        });

        tracing::info!("Spawned crawl job {} for property {}", id, property_id);
        self.jobs().insert(
            id,
            JobEntry {
                property_id,
                status: rx,
                cancel,
                handle: Some(handle),
            },
        );

        Ok(id)
    }

    /// Current status of a job, or None for an unknown id
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs().get(&id).map(|entry| entry.status.borrow().clone())
    }

    /// Property id a job was spawned for
    pub fn property_id(&self, id: JobId) -> Option<String> {
        self.jobs().get(&id).map(|entry| entry.property_id.clone())
    }

    /// Requests cancellation; the job stops before its next request
    pub fn cancel(&self, id: JobId) -> Result<(), PresaleError> {
        let jobs = self.jobs();
        let entry = jobs.get(&id).ok_or(PresaleError::UnknownJob(id))?;
        tracing::info!("Cancelling crawl job {}", id);
        entry.cancel.cancel();
        Ok(())
    }

    /// Waits for a job to finish and returns its report
    pub async fn wait(&self, id: JobId) -> Result<CrawlReport, PresaleError> {
        let mut status = self
            .jobs()
            .get(&id)
            .map(|entry| entry.status.clone())
            .ok_or(PresaleError::UnknownJob(id))?;

        let finished = status
            .wait_for(|s| !s.is_running())
            .await
            .map(|s| s.clone())
            .map_err(|_| PresaleError::JobAborted(id, "job task ended without a result".into()))?;

        match finished {
            JobStatus::Finished(report) => Ok(report),
            JobStatus::Failed(message) => Err(PresaleError::JobAborted(id, message)),
            JobStatus::Running => Err(PresaleError::JobAborted(id, "still running".into())),
        }
    }

    /// Drops a finished job and returns its final status
    ///
    /// A running job is kept and None is returned, as for an unknown id.
    pub fn forget(&self, id: JobId) -> Option<JobStatus> {
        let mut jobs = self.jobs();
        let status = jobs.get(&id)?.status.borrow().clone();
        if status.is_running() {
            return None;
        }
        jobs.remove(&id);
        Some(status)
    }

    /// Drops every finished job, returning how many were removed
    pub fn prune_finished(&self) -> usize {
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, entry| entry.status.borrow().is_running());
        before - jobs.len()
    }

    /// Ids of jobs that have not finished yet
    pub fn running(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs()
            .iter()
            .filter(|(_, entry)| entry.status.borrow().is_running())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Cancels every job and waits for their tasks to end
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<(JobId, JoinHandle<()>)> = self
            .jobs()
            .iter_mut()
            .filter_map(|(id, entry)| entry.handle.take().map(|h| (*id, h)))
            .collect();

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("Crawl job {} task panicked: {}", id, e);
            }
        }
    }
}
