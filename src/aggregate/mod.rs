//! Collects per-target results into a unified report.
//!
//! Callers suspend in [`Aggregator::await_completion`] until their
//! completion policy is satisfied or the job deadline fires; a job always
//! resolves to Complete, TimedOut, or Cancelled and never hangs.
//!
//! Policy choice for `First`/`Quorum`: satisfying the policy early does NOT
//! stop outstanding sends. They keep collecting in the background for audit
//! until the deadline, and the early report is a snapshot of what had
//! arrived when the policy was met.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::JobResult;
use crate::error::{FleetError, Result};
use crate::registry::{JobRecord, JobRegistry, JobStatus};

/// When `await_completion` should stop waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionPolicy {
    /// Wait until every expected target has responded or the deadline passes.
    All,
    /// Wait until this many distinct targets respond or the deadline passes.
    Quorum(usize),
    /// Return as soon as one target responds.
    First,
}

/// Final (or early-policy snapshot) view of a job, keyed by target id.
///
/// Ordering is canonical by target id, never by arrival order.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub results: BTreeMap<String, JobResult>,
    pub success: bool,
}

/// Collects results and produces job reports.
pub struct Aggregator {
    registry: Arc<JobRegistry>,
}

impl Aggregator {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Suspend until the policy is satisfied or the job deadline fires,
    /// then return the report.
    ///
    /// On deadline expiry every expected target still missing a result is
    /// synthesized as failed with error "timeout"; a cancelled job
    /// synthesizes "cancelled" the same way, so the report's target set
    /// always equals the resolved set.
    pub async fn await_completion(
        &self,
        job_id: Uuid,
        policy: CompletionPolicy,
    ) -> Result<JobReport> {
        let record = self.registry.snapshot(job_id).await?;
        if let CompletionPolicy::Quorum(n) = policy {
            if n > record.expected.len() {
                return Err(FleetError::QuorumTooLarge {
                    wanted: n,
                    expected: record.expected.len(),
                });
            }
        }

        let mut changes = self.registry.subscribe(job_id).await?;
        let deadline = tokio::time::Instant::from_std(record.deadline);

        loop {
            let record = self.registry.snapshot(job_id).await?;

            if record.status.is_terminal() {
                return Ok(build_report(&record, policy));
            }
            if policy_satisfied(&record, policy) {
                tracing::debug!(
                    job_id = %job_id,
                    policy = ?policy,
                    collected = record.results.len(),
                    "Completion policy satisfied early"
                );
                return Ok(build_report(&record, policy));
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        // Record was retired out from under us
                        return Err(FleetError::JobNotFound(job_id));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.registry.expire(job_id).await?;
                }
            }
        }
    }

    /// Current partial (or final) view of a job without waiting.
    pub async fn report_snapshot(&self, job_id: Uuid) -> Result<JobReport> {
        let record = self.registry.snapshot(job_id).await?;
        Ok(build_report(&record, CompletionPolicy::All))
    }
}

fn policy_satisfied(record: &JobRecord, policy: CompletionPolicy) -> bool {
    match policy {
        CompletionPolicy::All => record.results.len() == record.expected.len(),
        CompletionPolicy::Quorum(n) => record.results.len() >= n,
        CompletionPolicy::First => !record.results.is_empty(),
    }
}

fn build_report(record: &JobRecord, policy: CompletionPolicy) -> JobReport {
    let mut results = record.results.clone();

    // Synthesize failures for silent targets once the job is terminal, so
    // the report covers exactly the resolved target set. Early-policy
    // snapshots of a live job keep only what has actually arrived.
    let synth_detail = match record.status {
        JobStatus::TimedOut => Some("timeout"),
        JobStatus::Cancelled => Some("cancelled"),
        _ => None,
    };
    if let Some(detail) = synth_detail {
        for target_id in &record.expected {
            if !results.contains_key(target_id) {
                results.insert(
                    target_id.clone(),
                    JobResult::failure(record.request.job_id, target_id.clone(), detail),
                );
            }
        }
    }

    let succeeded_count = results.values().filter(|r| r.succeeded).count();
    let success = match policy {
        // Vacuously true for an empty expected set
        CompletionPolicy::All => results.values().all(|r| r.succeeded),
        CompletionPolicy::Quorum(n) => succeeded_count >= n,
        CompletionPolicy::First => succeeded_count >= 1,
    };

    JobReport {
        job_id: record.request.job_id,
        status: record.status,
        results,
        success,
    }
}
