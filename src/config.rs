use std::time::Duration;

/// Configuration for the dispatch hub.
///
/// Created once at process start and threaded through every component.
/// There is no ambient global state; everything that needs these values
/// receives a clone.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Timeout applied to a job when the caller does not supply one.
    pub default_timeout: Duration,
    /// Maximum number of concurrent per-target sends for a single job.
    pub max_fanout: usize,
    /// How long finished job records are kept before the reaper evicts them.
    pub retention: Duration,
    /// Interval at which the retention reaper scans the registry.
    pub reap_interval: Duration,
    /// Maximum number of job records held in the registry at once.
    pub max_jobs: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            max_fanout: 64,
            retention: Duration::from_secs(300),
            reap_interval: Duration::from_secs(30),
            max_jobs: 10_000,
        }
    }
}

impl HubConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_fanout(mut self, max_fanout: usize) -> Self {
        self.max_fanout = max_fanout;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }
}
