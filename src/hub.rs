//! The hub ties every component together behind one submission API.
//!
//! One hub is created at process start and threaded through explicitly —
//! there is no ambient global state. Callers submit jobs, query status or
//! partial reports, await completion under a policy, cancel, and retire.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::{Aggregator, CompletionPolicy, JobReport};
use crate::config::HubConfig;
use crate::dispatch::transport::Transport;
use crate::dispatch::Dispatcher;
use crate::envelope::Value;
use crate::error::Result;
use crate::persist::JobStore;
use crate::registry::{self, JobRegistry, JobStatus};
use crate::target::{Inventory, TargetSpec};

pub struct Hub {
    config: HubConfig,
    registry: Arc<JobRegistry>,
    dispatcher: Dispatcher,
    aggregator: Aggregator,
    store: Option<Arc<dyn JobStore>>,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        inventory: Arc<dyn Inventory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new(config.max_jobs));
        let dispatcher = Dispatcher::new(
            config.clone(),
            registry.clone(),
            inventory,
            transport,
        );
        let aggregator = Aggregator::new(registry.clone());
        Self {
            config,
            registry,
            dispatcher,
            aggregator,
            store: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach a persistence backend; retired records are written through.
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start the retention reaper. Runs until [`Hub::shutdown`] is called.
    pub fn start_reaper(&self) -> tokio::task::JoinHandle<()> {
        registry::spawn_reaper(
            self.registry.clone(),
            self.config.retention,
            self.config.reap_interval,
            self.shutdown.clone(),
        )
    }

    /// Submit a job against a target spec. Returns the job id immediately;
    /// collection proceeds in the background. `timeout: None` applies the
    /// configured default.
    pub async fn submit(
        &self,
        spec: &TargetSpec,
        function_path: &str,
        positional_args: Vec<Value>,
        keyword_args: BTreeMap<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Uuid> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        self.dispatcher
            .submit(spec, function_path, positional_args, keyword_args, timeout)
            .await
    }

    /// Suspend until the policy is satisfied or the deadline fires.
    pub async fn await_completion(
        &self,
        job_id: Uuid,
        policy: CompletionPolicy,
    ) -> Result<JobReport> {
        self.aggregator.await_completion(job_id, policy).await
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<JobStatus> {
        self.registry.get_status(job_id).await
    }

    /// Partial (or final) report without waiting.
    pub async fn report_snapshot(&self, job_id: Uuid) -> Result<JobReport> {
        self.aggregator.report_snapshot(job_id).await
    }

    /// Cancel a job. Local bookkeeping only: in-flight result deliveries
    /// for the job are discarded on arrival, but remote agents may still
    /// run the function to completion.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobStatus> {
        self.registry.cancel(job_id).await
    }

    /// Remove the job record, persisting it first when a store is attached.
    pub async fn retire(&self, job_id: Uuid) -> Result<()> {
        let record = self.registry.retire(job_id).await?;
        if let Some(store) = &self.store {
            store.persist(&record)?;
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
