//! Tracks outstanding jobs: id, state machine, deadline, received results.
//!
//! The registry owns every [`JobRecord`] and is the only cross-task shared
//! mutable structure in the crate. All access goes through its synchronized
//! methods; the dispatcher mutates records on send, the aggregator reads
//! them on collection, and nothing reaches into a record directly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::envelope::{JobRequest, JobResult};
use crate::error::{FleetError, Result};

/// Lifecycle of a job record.
///
/// Pending → Collecting → {Complete | TimedOut}, with Cancelled reachable
/// from any non-terminal state. Terminal records stay queryable until the
/// retention reaper evicts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Collecting,
    Complete,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::TimedOut | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Collecting => write!(f, "collecting"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::TimedOut => write!(f, "timed_out"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything the registry tracks for one job.
///
/// The result map never grows beyond the expected target set, and every
/// key in it is drawn from that set.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub request: JobRequest,
    pub expected: BTreeSet<String>,
    pub results: BTreeMap<String, JobResult>,
    pub deadline: Instant,
    pub status: JobStatus,
    /// Set when the record enters a terminal state; drives retention.
    pub finished_at: Option<Instant>,
}

struct JobEntry {
    record: JobRecord,
    // Version counter bumped on every mutation so waiters can wake
    notify: watch::Sender<u64>,
}

impl JobEntry {
    fn bump(&mut self) {
        self.notify.send_modify(|v| *v += 1);
    }

    fn finish(&mut self, status: JobStatus) {
        self.record.status = status;
        self.record.finished_at = Some(Instant::now());
        self.bump();
    }
}

/// Shared registry of outstanding and recently finished jobs.
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    max_jobs: usize,
}

impl JobRegistry {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            max_jobs,
        }
    }

    /// Register a new job with its expected target set and deadline.
    ///
    /// A job whose expected set is empty is Complete immediately: the spec
    /// matched nothing, which is a valid, vacuously successful outcome.
    pub async fn create(
        &self,
        request: JobRequest,
        expected: BTreeSet<String>,
        timeout: Duration,
    ) -> Result<Uuid> {
        let mut jobs = self.jobs.write().await;
        if jobs.len() >= self.max_jobs {
            return Err(FleetError::RegistryFull(self.max_jobs));
        }

        let job_id = request.job_id;
        let empty = expected.is_empty();
        let now = Instant::now();
        // Instant addition panics on overflow, so absurd timeouts are
        // turned into a validation error instead
        let deadline = now
            .checked_add(timeout)
            .ok_or(FleetError::InvalidTimeout(timeout))?;
        let record = JobRecord {
            request,
            expected,
            results: BTreeMap::new(),
            deadline,
            status: if empty {
                JobStatus::Complete
            } else {
                JobStatus::Pending
            },
            finished_at: if empty { Some(now) } else { None },
        };

        let (notify, _) = watch::channel(0);
        jobs.insert(job_id, JobEntry { record, notify });
        tracing::info!(job_id = %job_id, empty_match = empty, "Job registered");
        Ok(job_id)
    }

    /// Record one target's result for a job.
    ///
    /// Enforces the single-result-per-target invariant: duplicates are
    /// rejected with `DuplicateResult` and the first result stands. Results
    /// from targets outside the expected set are rejected with
    /// `UnexpectedTarget`, guarding against cross-job leakage and spoofed
    /// identifiers. Results arriving after the job reached a terminal state
    /// (cancelled, timed out, complete) are silently discarded.
    pub async fn record_result(&self, job_id: Uuid, result: JobResult) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(FleetError::JobNotFound(job_id))?;

        if entry.record.status.is_terminal() {
            tracing::debug!(
                job_id = %job_id,
                target_id = %result.target_id,
                status = %entry.record.status,
                "Discarding result for finished job"
            );
            return Ok(());
        }

        if !entry.record.expected.contains(&result.target_id) {
            tracing::warn!(
                job_id = %job_id,
                target_id = %result.target_id,
                "Discarding result from unexpected target"
            );
            return Err(FleetError::UnexpectedTarget {
                job_id,
                target_id: result.target_id,
            });
        }

        if entry.record.results.contains_key(&result.target_id) {
            tracing::warn!(
                job_id = %job_id,
                target_id = %result.target_id,
                "Discarding duplicate result"
            );
            return Err(FleetError::DuplicateResult {
                job_id,
                target_id: result.target_id,
            });
        }

        let target_id = result.target_id.clone();
        entry.record.results.insert(target_id.clone(), result);
        if entry.record.status == JobStatus::Pending {
            entry.record.status = JobStatus::Collecting;
        }

        if entry.record.results.len() == entry.record.expected.len() {
            entry.finish(JobStatus::Complete);
            tracing::info!(job_id = %job_id, "All expected results collected");
        } else {
            entry.bump();
            tracing::debug!(
                job_id = %job_id,
                target_id = %target_id,
                collected = entry.record.results.len(),
                expected = entry.record.expected.len(),
                "Result recorded"
            );
        }
        Ok(())
    }

    /// Mark a job as Collecting once the dispatcher has started sending.
    pub async fn mark_collecting(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(FleetError::JobNotFound(job_id))?;
        if entry.record.status == JobStatus::Pending {
            entry.record.status = JobStatus::Collecting;
            entry.bump();
        }
        Ok(())
    }

    /// Transition a job to TimedOut if its deadline passed before it
    /// finished. Returns the status after the call.
    pub async fn expire(&self, job_id: Uuid) -> Result<JobStatus> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(FleetError::JobNotFound(job_id))?;
        if !entry.record.status.is_terminal() && Instant::now() >= entry.record.deadline {
            entry.finish(JobStatus::TimedOut);
            tracing::info!(
                job_id = %job_id,
                collected = entry.record.results.len(),
                expected = entry.record.expected.len(),
                "Job deadline expired"
            );
        }
        Ok(entry.record.status)
    }

    /// Cancel a job. Any non-terminal state transitions to Cancelled;
    /// terminal states are left untouched. In-flight sends are abandoned as
    /// local bookkeeping only — the remote agent is an independent failure
    /// domain and may still execute the function.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobStatus> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(FleetError::JobNotFound(job_id))?;
        if !entry.record.status.is_terminal() {
            entry.finish(JobStatus::Cancelled);
            tracing::info!(job_id = %job_id, "Job cancelled");
        }
        Ok(entry.record.status)
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id)
            .map(|e| e.record.status)
            .ok_or(FleetError::JobNotFound(job_id))
    }

    /// Clone the full record for inspection or persistence.
    pub async fn snapshot(&self, job_id: Uuid) -> Result<JobRecord> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id)
            .map(|e| e.record.clone())
            .ok_or(FleetError::JobNotFound(job_id))
    }

    /// Subscribe to change notifications for a job. The receiver fires on
    /// every mutation of the record.
    pub async fn subscribe(&self, job_id: Uuid) -> Result<watch::Receiver<u64>> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id)
            .map(|e| e.notify.subscribe())
            .ok_or(FleetError::JobNotFound(job_id))
    }

    /// Remove a job record, returning it. Called after the caller has
    /// retrieved the final report.
    pub async fn retire(&self, job_id: Uuid) -> Result<JobRecord> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.remove(&job_id).ok_or(FleetError::JobNotFound(job_id))?;
        tracing::debug!(job_id = %job_id, "Job retired");
        Ok(entry.record)
    }

    /// Evict terminal records older than the retention window. Returns the
    /// number of records removed.
    pub async fn reap(&self, retention: Duration) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.record.finished_at {
            Some(finished) => finished.elapsed() < retention,
            None => true,
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!(removed, "Reaped retired job records");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

/// Spawn a background loop that periodically reaps finished records until
/// the cancellation token fires.
pub fn spawn_reaper(
    registry: Arc<JobRegistry>,
    retention: Duration,
    reap_interval: Duration,
    shutdown: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reap_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    registry.reap(retention).await;
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Reaper shutting down");
                    break;
                }
            }
        }
    })
}
