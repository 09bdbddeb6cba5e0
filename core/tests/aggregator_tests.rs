// tests/aggregator_tests.rs
mod common;

use common::*;
use nfviz::{RunConfig, StatusAggregator, TaskId, TaskStatus};
use serial_test::serial;
use std::sync::Arc;

fn aggregator(store: FakeStore, jobs: FakeJobs, notebooks: FakeNotebooks) -> StatusAggregator {
  let config = Arc::new(RunConfig::new("test-project", "us-central1"));
  StatusAggregator::new(config, &collaborators(store, jobs, notebooks))
}

#[tokio::test]
#[serial]
async fn test_job_failure_leaves_other_probes_intact() {
  setup_tracing();
  let snapshot = aggregator(
    FakeStore::default().with_bucket("test-project-bucket", "US-CENTRAL1"),
    FakeJobs::unreachable("permission denied on batch.jobs.list"),
    FakeNotebooks::with_state("nextflow-workbench", "ACTIVE"),
  )
  .snapshot()
  .await;

  let bucket = snapshot.bucket.value.as_ref().expect("bucket populated");
  assert!(bucket.exists);
  assert_eq!(bucket.location.as_deref(), Some("US-CENTRAL1"));
  let env = snapshot.environment.value.as_ref().expect("environment populated");
  assert_eq!(env.state, "ACTIVE");
  assert_eq!(snapshot.jobs.error.as_deref(), Some("permission denied on batch.jobs.list"));
  assert!(!snapshot.pipeline_running);
  assert!(!snapshot.all_complete);
}

#[tokio::test]
#[serial]
async fn test_missing_resources_are_not_errors() {
  setup_tracing();
  let snapshot = aggregator(FakeStore::default(), FakeJobs::listing(vec![]), FakeNotebooks::missing())
    .snapshot()
    .await;

  assert!(snapshot.bucket.is_ok());
  assert_eq!(snapshot.bucket.value.as_ref().map(|b| b.exists), Some(false));
  assert_eq!(snapshot.environment.value.as_ref().map(|e| e.state.as_str()), Some("NOT_FOUND"));
  assert_eq!(snapshot.jobs.error, None);
}

#[tokio::test]
#[serial]
async fn test_storage_failure_is_captured_per_field() {
  setup_tracing();
  let store = FakeStore::default();
  *store.fail_with.lock() = Some("storage unavailable".to_string());
  let snapshot = aggregator(
    store,
    FakeJobs::listing(vec![job("nf-FASTQC-1", "RUNNING", 1)]),
    FakeNotebooks::with_state("nextflow-workbench", "PROVISIONING"),
  )
  .snapshot()
  .await;

  assert_eq!(snapshot.bucket.error.as_deref(), Some("storage unavailable"));
  assert!(snapshot.bucket.value.is_none());
  assert_eq!(snapshot.jobs.tasks.get(TaskId::Fastqc), TaskStatus::Running);
  assert!(snapshot.pipeline_running);

  let json = serde_json::to_value(&snapshot).expect("serialize");
  assert_eq!(json["bucket"], serde_json::json!({"error": "storage unavailable"}));
  assert_eq!(json["environment"]["state"], "PROVISIONING");
  assert_eq!(json["jobs"]["tasks"]["fastqc"], "running");
  assert!(json["checkedAt"].is_string());
}
