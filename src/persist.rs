//! Optional durability seam for job records.
//!
//! The core treats persistence as pluggable: the hub persists a record when
//! it is retired and can load it back for later queries. Deployments that
//! need durability across restarts supply their own store; everyone else
//! gets the in-memory one.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::Result;
use crate::registry::JobRecord;

pub trait JobStore: Send + Sync {
    fn persist(&self, record: &JobRecord) -> Result<()>;
    fn load(&self, job_id: Uuid) -> Result<Option<JobRecord>>;
}

/// Process-local store, mostly useful for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().expect("store lock poisoned").is_empty()
    }
}

impl JobStore for MemoryStore {
    fn persist(&self, record: &JobRecord) -> Result<()> {
        let mut records = self.records.write().expect("store lock poisoned");
        records.insert(record.request.job_id, record.clone());
        Ok(())
    }

    fn load(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let records = self.records.read().expect("store lock poisoned");
        Ok(records.get(&job_id).cloned())
    }
}
