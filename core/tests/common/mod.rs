// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use nfviz::external::{
  BatchJobClient, BucketInfo, ExternalJob, FirewallSpec, IamClient, IamPolicy, NetworkClient, NetworkSpec,
  NotebookClient, NotebookInstance, NotebookSpec, ObjectInfo, ObjectStore, Operation, OperationScope, RouterInfo,
  RouterSpec, ServiceAccount, ServiceUsageClient, SubnetworkInfo,
};
use nfviz::{Collaborators, Event, EventStream, ExternalError, ExternalResult, FlowError, StepContext, StepControl};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;

// --- Common Context Struct ---
#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub sub_steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

// --- Common Error Type for Tests ---
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Flow error: {0}")]
  Flow(String), // Stored as String for Eq comparison

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<FlowError> for TestError {
  fn from(fe: FlowError) -> Self {
    TestError::Flow(fe.to_string())
  }
}

// --- Common Handler Creators ---
pub fn create_simple_handler(sub_step: &'static str) -> nfviz::Handler<TestContext, TestError> {
  Box::new(move |ctx: StepContext<TestContext>| {
    Box::pin(async move {
      let stop = {
        let mut guard = ctx.write();
        guard.counter += 1;
        guard.sub_steps_executed.push(sub_step.to_string());
        guard.should_stop_at.as_deref() == Some(sub_step)
      };
      ctx.events().info(format!("ran {sub_step}"));
      tracing::debug!(target: "test_handlers", %sub_step, "executed");
      if stop {
        Ok(StepControl::Stop)
      } else {
        Ok(StepControl::Continue)
      }
    })
  })
}

pub fn create_failing_handler(
  sub_step: &'static str,
  error_message: &'static str,
) -> nfviz::Handler<TestContext, TestError> {
  Box::new(move |ctx: StepContext<TestContext>| {
    Box::pin(async move {
      ctx.write().sub_steps_executed.push(sub_step.to_string());
      tracing::warn!(target: "test_handlers", %sub_step, "failing with: '{}'", error_message);
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

// --- Helper for Tracing Setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

/// Drains a stream to completion.
pub async fn collect(stream: EventStream) -> Vec<Event> {
  stream.collect().await
}

/// Asserts the stream shape every execution must have.
pub fn assert_well_formed(events: &[Event]) {
  let terminals = events.iter().filter(|e| e.is_terminal()).count();
  assert_eq!(terminals, 1, "exactly one terminal event expected: {events:?}");
  assert!(events.last().is_some_and(Event::is_terminal), "terminal must be last: {events:?}");
}

pub fn at(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid timestamp")
}

pub fn job(name: &str, state: &str, created: i64) -> ExternalJob {
  ExternalJob {
    name: format!("projects/test-project/locations/us-central1/jobs/{name}"),
    state: state.to_string(),
    create_time: at(created),
    task_label: None,
  }
}

// --- In-memory collaborators ---

#[derive(Default)]
pub struct FakeStore {
  pub buckets: Mutex<BTreeMap<String, String>>,
  pub objects: Mutex<BTreeMap<String, String>>,
  pub fail_with: Mutex<Option<String>>,
}

impl FakeStore {
  pub fn with_bucket(self, name: &str, location: &str) -> Self {
    self.buckets.lock().insert(name.to_string(), location.to_string());
    self
  }

  pub fn with_object(self, name: &str, body: &str) -> Self {
    self.objects.lock().insert(name.to_string(), body.to_string());
    self
  }

  fn check(&self) -> ExternalResult<()> {
    match self.fail_with.lock().clone() {
      Some(msg) => Err(ExternalError::failed(msg)),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl ObjectStore for FakeStore {
  async fn get_bucket(&self, bucket: &str) -> ExternalResult<BucketInfo> {
    self.check()?;
    self
      .buckets
      .lock()
      .get(bucket)
      .map(|location| BucketInfo {
        name: bucket.to_string(),
        location: location.clone(),
      })
      .ok_or_else(|| ExternalError::not_found(format!("bucket {bucket}")))
  }

  async fn create_bucket(&self, bucket: &str, location: &str) -> ExternalResult<BucketInfo> {
    self.check()?;
    let mut buckets = self.buckets.lock();
    if buckets.contains_key(bucket) {
      return Err(ExternalError::already_exists(format!("bucket {bucket}")));
    }
    buckets.insert(bucket.to_string(), location.to_string());
    Ok(BucketInfo {
      name: bucket.to_string(),
      location: location.to_string(),
    })
  }

  async fn list_objects(&self, _bucket: &str, prefix: &str, max_results: usize) -> ExternalResult<Vec<ObjectInfo>> {
    self.check()?;
    Ok(
      self
        .objects
        .lock()
        .iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .take(max_results)
        .map(|(name, body)| ObjectInfo {
          name: name.clone(),
          size: body.len() as u64,
        })
        .collect(),
    )
  }

  async fn read_object(&self, _bucket: &str, name: &str) -> ExternalResult<String> {
    self.check()?;
    self
      .objects
      .lock()
      .get(name)
      .cloned()
      .ok_or_else(|| ExternalError::not_found(format!("object {name}")))
  }
}

pub struct FakeJobs {
  pub result: Mutex<ExternalResult<Vec<ExternalJob>>>,
}

impl FakeJobs {
  pub fn listing(jobs: Vec<ExternalJob>) -> Self {
    Self {
      result: Mutex::new(Ok(jobs)),
    }
  }

  pub fn unreachable(msg: &str) -> Self {
    Self {
      result: Mutex::new(Err(ExternalError::failed(msg))),
    }
  }
}

#[async_trait]
impl BatchJobClient for FakeJobs {
  async fn list_jobs(&self, _parent: &str) -> ExternalResult<Vec<ExternalJob>> {
    self.result.lock().clone()
  }
}

pub struct FakeNotebooks {
  pub instance: Mutex<ExternalResult<NotebookInstance>>,
}

impl FakeNotebooks {
  pub fn with_state(name: &str, state: &str) -> Self {
    Self {
      instance: Mutex::new(Ok(NotebookInstance {
        name: name.to_string(),
        state: state.to_string(),
        proxy_uri: Some("abc.notebooks.googleusercontent.com".to_string()),
      })),
    }
  }

  pub fn missing() -> Self {
    Self {
      instance: Mutex::new(Err(ExternalError::not_found("instance"))),
    }
  }
}

#[async_trait]
impl NotebookClient for FakeNotebooks {
  async fn get_instance(&self, _instance: &str) -> ExternalResult<NotebookInstance> {
    self.instance.lock().clone()
  }

  async fn create_instance(&self, _parent: &str, _id: &str, _spec: &NotebookSpec) -> ExternalResult<Operation> {
    Err(ExternalError::failed("not used in core tests"))
  }

  async fn get_operation(&self, _name: &str) -> ExternalResult<Operation> {
    Err(ExternalError::failed("not used in core tests"))
  }

  async fn list_operations(&self, _parent: &str) -> ExternalResult<Vec<Operation>> {
    Ok(Vec::new())
  }
}

/// Stands in for the collaborators the core tests never reach.
pub struct Unused;

#[async_trait]
impl ServiceUsageClient for Unused {
  async fn enable_service(&self, _project: &str, _service: &str) -> ExternalResult<()> {
    Err(ExternalError::failed("unused"))
  }
}

#[async_trait]
impl IamClient for Unused {
  async fn get_service_account(&self, _project: &str, _email: &str) -> ExternalResult<ServiceAccount> {
    Err(ExternalError::failed("unused"))
  }

  async fn create_service_account(&self, _p: &str, _id: &str, _d: &str) -> ExternalResult<ServiceAccount> {
    Err(ExternalError::failed("unused"))
  }

  async fn get_policy(&self, _project: &str) -> ExternalResult<IamPolicy> {
    Err(ExternalError::failed("unused"))
  }

  async fn set_policy(&self, _project: &str, _policy: &IamPolicy) -> ExternalResult<IamPolicy> {
    Err(ExternalError::failed("unused"))
  }
}

#[async_trait]
impl NetworkClient for Unused {
  async fn get_network(&self, _project: &str, _name: &str) -> ExternalResult<()> {
    Err(ExternalError::failed("unused"))
  }

  async fn insert_network(&self, _project: &str, _spec: &NetworkSpec) -> ExternalResult<Operation> {
    Err(ExternalError::failed("unused"))
  }

  async fn get_firewall(&self, _project: &str, _name: &str) -> ExternalResult<()> {
    Err(ExternalError::failed("unused"))
  }

  async fn insert_firewall(&self, _project: &str, _spec: &FirewallSpec) -> ExternalResult<Operation> {
    Err(ExternalError::failed("unused"))
  }

  async fn get_router(&self, _project: &str, _region: &str, _name: &str) -> ExternalResult<RouterInfo> {
    Err(ExternalError::failed("unused"))
  }

  async fn insert_router(&self, _project: &str, _spec: &RouterSpec) -> ExternalResult<Operation> {
    Err(ExternalError::failed("unused"))
  }

  async fn get_subnetwork(&self, _project: &str, _region: &str, _name: &str) -> ExternalResult<SubnetworkInfo> {
    Err(ExternalError::failed("unused"))
  }

  async fn enable_private_google_access(&self, _p: &str, _r: &str, _s: &str) -> ExternalResult<Operation> {
    Err(ExternalError::failed("unused"))
  }

  async fn get_operation(&self, _project: &str, _scope: &OperationScope, _name: &str) -> ExternalResult<Operation> {
    Err(ExternalError::failed("unused"))
  }
}

pub fn collaborators(store: FakeStore, jobs: FakeJobs, notebooks: FakeNotebooks) -> Collaborators {
  let storage: Arc<FakeStore> = Arc::new(store);
  Collaborators {
    storage,
    services: Arc::new(Unused),
    iam: Arc::new(Unused),
    network: Arc::new(Unused),
    notebooks: Arc::new(notebooks),
    jobs: Arc::new(jobs),
  }
}
