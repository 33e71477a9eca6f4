//! Fans a job out to every resolved target.
//!
//! `submit` validates, registers the job, and returns immediately; all
//! per-target sends run as independent tasks under a fan-out semaphore.
//! Each transmission is isolated: a send failure, connection refusal, or
//! per-target timeout marks that one target failed and never aborts its
//! siblings.

pub mod transport;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::HubConfig;
use crate::envelope::{self, JobRequest, JobResult, Value};
use crate::error::{FleetError, Result};
use crate::registry::JobRegistry;
use crate::target::{self, Inventory, Target, TargetSpec};
use transport::Transport;

pub struct Dispatcher {
    config: HubConfig,
    registry: Arc<JobRegistry>,
    inventory: Arc<dyn Inventory>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        config: HubConfig,
        registry: Arc<JobRegistry>,
        inventory: Arc<dyn Inventory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            inventory,
            transport,
        }
    }

    /// Resolve targets, register the job, and start the fan-out.
    ///
    /// Returns the job id as soon as the job is registered; result
    /// collection happens asynchronously. Only resolution and validation
    /// errors surface here — everything downstream folds into the report.
    pub async fn submit(
        &self,
        spec: &TargetSpec,
        function_path: &str,
        positional_args: Vec<Value>,
        keyword_args: BTreeMap<String, Value>,
        timeout: Duration,
    ) -> Result<Uuid> {
        if function_path.is_empty() {
            return Err(FleetError::InvalidFunctionPath(function_path.to_string()));
        }

        // Validate arguments up front so runaway nesting and non-finite
        // floats are rejected synchronously to the caller
        for arg in &positional_args {
            arg.validate()?;
        }
        for value in keyword_args.values() {
            value.validate()?;
        }

        let targets = target::resolve(spec, self.inventory.as_ref())?;
        let request = JobRequest::new(function_path, positional_args, keyword_args);
        let expected: BTreeSet<String> = targets.iter().map(|t| t.id.clone()).collect();

        let payload = envelope::encode_request(&request)?;
        let job_id = self
            .registry
            .create(request, expected, timeout)
            .await?;

        tracing::info!(
            job_id = %job_id,
            function = function_path,
            targets = targets.len(),
            "Job submitted"
        );

        if targets.is_empty() {
            // Already Complete in the registry; nothing to send
            return Ok(job_id);
        }

        self.spawn_fanout(job_id, targets, payload, timeout).await;
        Ok(job_id)
    }

    async fn spawn_fanout(
        &self,
        job_id: Uuid,
        targets: BTreeSet<Target>,
        payload: Vec<u8>,
        timeout: Duration,
    ) {
        // Sends are in flight from here on
        if let Err(e) = self.registry.mark_collecting(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to mark job collecting");
        }

        // Deadline watchdog: flips the job to TimedOut if collection does
        // not finish in time, independent of any waiter
        let watchdog_registry = self.registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Err(e) = watchdog_registry.expire(job_id).await {
                tracing::debug!(job_id = %job_id, error = %e, "Deadline watchdog found no record");
            }
        });

        let fanout = Arc::new(Semaphore::new(self.config.max_fanout.max(1)));
        for target in targets {
            let registry = self.registry.clone();
            let transport = self.transport.clone();
            let payload = payload.clone();
            let fanout = fanout.clone();

            tokio::spawn(async move {
                let _permit = match fanout.acquire().await {
                    Ok(permit) => permit,
                    // Semaphore lives as long as this task holds its clone
                    Err(_) => return,
                };

                let result = send_one(job_id, &target, transport.as_ref(), payload, timeout).await;
                match registry.record_result(job_id, result).await {
                    Ok(()) => {}
                    Err(
                        e @ (FleetError::DuplicateResult { .. }
                        | FleetError::UnexpectedTarget { .. }),
                    ) => {
                        // Already logged by the registry; nothing to escalate
                        tracing::debug!(job_id = %job_id, error = %e, "Result discarded");
                    }
                    Err(e) => {
                        tracing::debug!(job_id = %job_id, error = %e, "Result dropped");
                    }
                }
            });
        }
    }
}

/// Send one envelope and turn every failure mode into a JobResult.
async fn send_one(
    job_id: Uuid,
    target: &Target,
    transport: &dyn Transport,
    payload: Vec<u8>,
    timeout: Duration,
) -> JobResult {
    let reply = tokio::time::timeout(timeout, transport.send(target, payload)).await;
    match reply {
        Ok(Ok(bytes)) => match envelope::decode_result(&bytes) {
            Ok(result) => {
                if result.job_id != job_id || result.target_id != target.id {
                    tracing::warn!(
                        job_id = %job_id,
                        target_id = %target.id,
                        claimed_job = %result.job_id,
                        claimed_target = %result.target_id,
                        "Response identity mismatch"
                    );
                    JobResult::failure(job_id, target.id.clone(), "response identity mismatch")
                } else {
                    result
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, target_id = %target.id, error = %e, "Malformed response");
                JobResult::failure(job_id, target.id.clone(), e.to_string())
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(job_id = %job_id, target_id = %target.id, error = %e, "Send failed");
            JobResult::failure(job_id, target.id.clone(), e.to_string())
        }
        Err(_) => {
            tracing::warn!(job_id = %job_id, target_id = %target.id, "Target timed out");
            JobResult::failure(job_id, target.id.clone(), "timeout")
        }
    }
}
