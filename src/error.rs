use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Invalid target spec: {0}")]
    InvalidTargetSpec(String),

    #[error("Invalid function path: {0:?}")]
    InvalidFunctionPath(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Value nesting exceeds maximum depth of {max_depth}")]
    CyclicValue { max_depth: usize },

    #[error("Non-finite float {0} has no wire representation")]
    NonFiniteFloat(f64),

    #[error("Timeout of {0:?} is too large")]
    InvalidTimeout(std::time::Duration),

    #[error("Duplicate result for job {job_id} from target {target_id}")]
    DuplicateResult { job_id: Uuid, target_id: String },

    #[error("Result for job {job_id} from unexpected target {target_id}")]
    UnexpectedTarget { job_id: Uuid, target_id: String },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Quorum of {wanted} exceeds expected target count {expected}")]
    QuorumTooLarge { wanted: usize, expected: usize },

    #[error("Job registry at capacity ({0} jobs)")]
    RegistryFull(usize),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;
