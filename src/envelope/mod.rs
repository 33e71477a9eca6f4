//! Wire envelopes for job requests and results.
//!
//! Requests and results cross the transport boundary as JSON-encoded
//! envelopes. The codec round-trips exactly: `decode(encode(x)) == x` for
//! every well-formed value. Anything truncated or type-mismatched decodes
//! to `MalformedEnvelope`, which the dispatcher treats as a per-target
//! failure rather than a job-level fault.

pub mod value;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FleetError, Result};
pub use value::{Value, MAX_VALUE_DEPTH};

/// A request to run one named function against a set of targets.
///
/// Immutable after creation; the same encoded request is fanned out to
/// every resolved target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: Uuid,
    pub function_path: String,
    pub positional_args: Vec<Value>,
    pub keyword_args: BTreeMap<String, Value>,
    pub issued_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn new(
        function_path: impl Into<String>,
        positional_args: Vec<Value>,
        keyword_args: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            function_path: function_path.into(),
            positional_args,
            keyword_args,
            issued_at: Utc::now(),
        }
    }
}

/// One target's answer to a job request.
///
/// At most one result is recorded per (job_id, target_id) pair; the
/// registry rejects duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub target_id: String,
    pub succeeded: bool,
    pub return_value: Value,
    pub error_detail: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl JobResult {
    pub fn success(job_id: Uuid, target_id: impl Into<String>, return_value: Value) -> Self {
        Self {
            job_id,
            target_id: target_id.into(),
            succeeded: true,
            return_value,
            error_detail: None,
            received_at: Utc::now(),
        }
    }

    pub fn failure(job_id: Uuid, target_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            job_id,
            target_id: target_id.into(),
            succeeded: false,
            return_value: Value::Null,
            error_detail: Some(detail.into()),
            received_at: Utc::now(),
        }
    }
}

/// Tagged wire form distinguishing requests from results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Envelope {
    Request(JobRequest),
    Result(JobResult),
}

/// Encode a job request for transmission.
///
/// Argument values are validated first so pathological nesting and
/// non-finite floats are rejected at the submission boundary.
pub fn encode_request(request: &JobRequest) -> Result<Vec<u8>> {
    for arg in &request.positional_args {
        arg.validate()?;
    }
    for value in request.keyword_args.values() {
        value.validate()?;
    }
    serde_json::to_vec(&Envelope::Request(request.clone()))
        .map_err(|e| FleetError::MalformedEnvelope(e.to_string()))
}

pub fn decode_request(bytes: &[u8]) -> Result<JobRequest> {
    match serde_json::from_slice::<Envelope>(bytes) {
        Ok(Envelope::Request(request)) => Ok(request),
        Ok(Envelope::Result(_)) => Err(FleetError::MalformedEnvelope(
            "expected request envelope, got result".to_string(),
        )),
        Err(e) => Err(FleetError::MalformedEnvelope(e.to_string())),
    }
}

pub fn encode_result(result: &JobResult) -> Result<Vec<u8>> {
    result.return_value.validate()?;
    serde_json::to_vec(&Envelope::Result(result.clone()))
        .map_err(|e| FleetError::MalformedEnvelope(e.to_string()))
}

pub fn decode_result(bytes: &[u8]) -> Result<JobResult> {
    match serde_json::from_slice::<Envelope>(bytes) {
        Ok(Envelope::Result(result)) => Ok(result),
        Ok(Envelope::Request(_)) => Err(FleetError::MalformedEnvelope(
            "expected result envelope, got request".to_string(),
        )),
        Err(e) => Err(FleetError::MalformedEnvelope(e.to_string())),
    }
}
