//! fleet-lite: a remote command dispatch and result-aggregation core.
//!
//! One controller invokes named operations against many remote targets,
//! tracks in-flight jobs, collects heterogeneous results, and reports
//! structured success/failure.

pub mod agent;
pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod persist;
pub mod registry;
pub mod target;

pub use aggregate::{CompletionPolicy, JobReport};
pub use config::HubConfig;
pub use envelope::{JobRequest, JobResult, Value};
pub use error::{FleetError, Result};
pub use hub::Hub;
pub use registry::JobStatus;
pub use target::{Target, TargetSpec};
