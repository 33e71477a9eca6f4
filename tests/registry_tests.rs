//! Job registry state machine and invariant tests.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use fleet_lite::envelope::{JobRequest, JobResult, Value};
use fleet_lite::error::FleetError;
use fleet_lite::registry::{JobRegistry, JobStatus};
use uuid::Uuid;

fn request(function: &str) -> JobRequest {
    JobRequest::new(function, Vec::new(), BTreeMap::new())
}

fn targets(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn new_job_is_pending() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&["a", "b"]), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(registry.get_status(job_id).await.unwrap(), JobStatus::Pending);
    let record = registry.snapshot(job_id).await.unwrap();
    assert_eq!(record.expected.len(), 2);
    assert!(record.results.is_empty());
}

#[tokio::test]
async fn absurd_timeout_is_rejected_at_creation() {
    let registry = JobRegistry::new(100);
    let err = registry
        .create(request("test.ping"), targets(&["a"]), Duration::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::InvalidTimeout(_)));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn empty_target_set_is_complete_immediately() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&[]), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(
        registry.get_status(job_id).await.unwrap(),
        JobStatus::Complete
    );
    assert!(registry.snapshot(job_id).await.unwrap().results.is_empty());
}

#[tokio::test]
async fn first_result_moves_pending_to_collecting() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&["a", "b"]), TIMEOUT)
        .await
        .unwrap();

    registry
        .record_result(job_id, JobResult::success(job_id, "a", Value::Bool(true)))
        .await
        .unwrap();
    assert_eq!(
        registry.get_status(job_id).await.unwrap(),
        JobStatus::Collecting
    );

    registry
        .record_result(job_id, JobResult::success(job_id, "b", Value::Bool(true)))
        .await
        .unwrap();
    assert_eq!(
        registry.get_status(job_id).await.unwrap(),
        JobStatus::Complete
    );
}

#[tokio::test]
async fn duplicate_result_is_rejected_and_first_stands() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&["a", "b"]), TIMEOUT)
        .await
        .unwrap();

    registry
        .record_result(job_id, JobResult::success(job_id, "a", Value::Int(1)))
        .await
        .unwrap();

    let err = registry
        .record_result(job_id, JobResult::success(job_id, "a", Value::Int(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::DuplicateResult { .. }));

    let record = registry.snapshot(job_id).await.unwrap();
    assert_eq!(record.results["a"].return_value, Value::Int(1));
    assert_eq!(record.results.len(), 1);
}

#[tokio::test]
async fn unexpected_target_is_rejected() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&["a"]), TIMEOUT)
        .await
        .unwrap();

    let err = registry
        .record_result(
            job_id,
            JobResult::success(job_id, "intruder", Value::Bool(true)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::UnexpectedTarget { .. }));

    let record = registry.snapshot(job_id).await.unwrap();
    assert!(record.results.is_empty());
    // The invariant holds: the result map never grows beyond the expected set
    assert!(record.results.len() <= record.expected.len());
}

#[tokio::test]
async fn mark_collecting_only_moves_pending() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&["a"]), TIMEOUT)
        .await
        .unwrap();

    registry.mark_collecting(job_id).await.unwrap();
    assert_eq!(
        registry.get_status(job_id).await.unwrap(),
        JobStatus::Collecting
    );

    registry
        .record_result(job_id, JobResult::success(job_id, "a", Value::Null))
        .await
        .unwrap();
    // Terminal now; another mark_collecting must not regress the status
    registry.mark_collecting(job_id).await.unwrap();
    assert_eq!(
        registry.get_status(job_id).await.unwrap(),
        JobStatus::Complete
    );
}

#[tokio::test]
async fn cancel_transitions_non_terminal_and_discards_later_results() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&["a", "b"]), TIMEOUT)
        .await
        .unwrap();

    registry
        .record_result(job_id, JobResult::success(job_id, "a", Value::Bool(true)))
        .await
        .unwrap();

    let status = registry.cancel(job_id).await.unwrap();
    assert_eq!(status, JobStatus::Cancelled);
    assert_eq!(
        registry.get_status(job_id).await.unwrap(),
        JobStatus::Cancelled
    );

    // Late result is discarded, not an error and not merged
    registry
        .record_result(job_id, JobResult::success(job_id, "b", Value::Bool(true)))
        .await
        .unwrap();
    let record = registry.snapshot(job_id).await.unwrap();
    assert_eq!(record.results.len(), 1);
    assert_eq!(record.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_leaves_terminal_status_untouched() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&[]), TIMEOUT)
        .await
        .unwrap();

    let status = registry.cancel(job_id).await.unwrap();
    assert_eq!(status, JobStatus::Complete);
}

#[tokio::test]
async fn expire_honors_the_deadline() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(
            request("test.ping"),
            targets(&["a"]),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

    // Deadline has not passed yet
    let status = registry.expire(job_id).await.unwrap();
    assert_eq!(status, JobStatus::Pending);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let status = registry.expire(job_id).await.unwrap();
    assert_eq!(status, JobStatus::TimedOut);
}

#[tokio::test]
async fn expire_does_not_touch_completed_jobs() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(
            request("test.ping"),
            targets(&["a"]),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
    registry
        .record_result(job_id, JobResult::success(job_id, "a", Value::Null))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    let status = registry.expire(job_id).await.unwrap();
    assert_eq!(status, JobStatus::Complete);
}

#[tokio::test]
async fn retire_removes_the_record() {
    let registry = JobRegistry::new(100);
    let job_id = registry
        .create(request("test.ping"), targets(&[]), TIMEOUT)
        .await
        .unwrap();

    let record = registry.retire(job_id).await.unwrap();
    assert_eq!(record.request.job_id, job_id);

    let err = registry.get_status(job_id).await.unwrap_err();
    assert!(matches!(err, FleetError::JobNotFound(_)));
    let err = registry.retire(job_id).await.unwrap_err();
    assert!(matches!(err, FleetError::JobNotFound(_)));
}

#[tokio::test]
async fn unknown_job_queries_fail() {
    let registry = JobRegistry::new(100);
    let bogus = Uuid::new_v4();
    assert!(matches!(
        registry.get_status(bogus).await.unwrap_err(),
        FleetError::JobNotFound(_)
    ));
    assert!(matches!(
        registry
            .record_result(bogus, JobResult::failure(bogus, "a", "late"))
            .await
            .unwrap_err(),
        FleetError::JobNotFound(_)
    ));
}

#[tokio::test]
async fn reap_evicts_finished_records_after_retention() {
    let registry = JobRegistry::new(100);
    let finished = registry
        .create(request("test.ping"), targets(&[]), TIMEOUT)
        .await
        .unwrap();
    let open = registry
        .create(request("test.ping"), targets(&["a"]), TIMEOUT)
        .await
        .unwrap();

    // Inside the retention window nothing goes
    assert_eq!(registry.reap(Duration::from_secs(60)).await, 0);
    assert_eq!(registry.len().await, 2);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let removed = registry.reap(Duration::from_millis(10)).await;
    assert_eq!(removed, 1);
    assert!(matches!(
        registry.get_status(finished).await.unwrap_err(),
        FleetError::JobNotFound(_)
    ));
    // Unfinished jobs are never reaped
    assert_eq!(registry.get_status(open).await.unwrap(), JobStatus::Pending);
}

#[tokio::test]
async fn registry_capacity_is_enforced() {
    let registry = JobRegistry::new(1);
    registry
        .create(request("test.ping"), targets(&["a"]), TIMEOUT)
        .await
        .unwrap();

    let err = registry
        .create(request("test.ping"), targets(&["a"]), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::RegistryFull(1)));
}
