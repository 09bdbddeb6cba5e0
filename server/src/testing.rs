// nfviz/server/src/testing.rs

//! One in-memory cloud behind every collaborator trait, for step and handler
//! tests. Creations are remembered so a second run finds what the first made.

use crate::config::{AppConfig, StepSettings};
use crate::steps::contexts::StepEnv;
use async_trait::async_trait;
use futures_util::StreamExt;
use nfviz::external::{
  BatchJobClient, BucketInfo, ExternalJob, FirewallSpec, IamClient, IamPolicy, NetworkClient, NetworkSpec,
  NotebookClient, NotebookInstance, NotebookSpec, ObjectInfo, ObjectStore, Operation, OperationScope, RouterInfo,
  RouterSpec, ServiceAccount, ServiceUsageClient, SubnetworkInfo,
};
use nfviz::{Collaborators, Event, EventStream, ExternalError, ExternalResult, RunConfig, TerminalStatus};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PROJECT: &str = "wz-workload-viz";
pub const REGION: &str = "us-central1";

#[derive(Default)]
pub struct FakeCloud {
  buckets: Mutex<BTreeMap<String, String>>,
  objects: Mutex<BTreeMap<String, String>>,
  storage_failure: Mutex<Option<ExternalError>>,

  refused_services: Mutex<HashMap<String, ExternalError>>,

  service_accounts: Mutex<BTreeSet<String>>,
  policy: Mutex<IamPolicy>,

  networks: Mutex<BTreeSet<String>>,
  firewalls: Mutex<BTreeSet<String>>,
  routers: Mutex<BTreeMap<String, RouterInfo>>,
  private_access: Mutex<bool>,
  subnetwork_failure: Mutex<Option<ExternalError>>,

  instances: Mutex<BTreeMap<String, NotebookInstance>>,
  /// Pending creation operations by name, with the instance path they target.
  notebook_operations: Mutex<BTreeMap<String, String>>,

  jobs: Mutex<Vec<ExternalJob>>,
  jobs_failure: Mutex<Option<ExternalError>>,

  created_buckets: AtomicUsize,
  created_networks: AtomicUsize,
  created_notebooks: AtomicUsize,
  policy_writes: AtomicUsize,
  operation_seq: AtomicUsize,
}

impl FakeCloud {
  pub fn shared() -> Arc<Self> {
    Arc::new(Self::default())
  }

  // --- Arrangement ---

  pub fn refuse_service(&self, service: &str, err: ExternalError) {
    self.refused_services.lock().insert(service.to_string(), err);
  }

  pub fn with_policy(&self, edit: impl FnOnce(&mut IamPolicy)) {
    edit(&mut self.policy.lock());
  }

  pub fn fail_subnetwork(&self, err: ExternalError) {
    *self.subnetwork_failure.lock() = Some(err);
  }

  pub fn fail_storage(&self, err: ExternalError) {
    *self.storage_failure.lock() = Some(err);
  }

  pub fn set_jobs(&self, jobs: Vec<ExternalJob>) {
    *self.jobs.lock() = jobs;
  }

  pub fn make_jobs_unreachable(&self) {
    *self.jobs_failure.lock() = Some(ExternalError::failed("batch.googleapis.com unreachable"));
  }

  pub fn put_bucket(&self, name: &str, location: &str) {
    self.buckets.lock().insert(name.to_string(), location.to_string());
  }

  pub fn put_object(&self, name: &str, body: &str) {
    self.objects.lock().insert(name.to_string(), body.to_string());
  }

  pub fn put_instance(&self, instance: NotebookInstance) {
    self.instances.lock().insert(instance.name.clone(), instance);
  }

  // --- Inspection ---

  pub fn policy(&self) -> IamPolicy {
    self.policy.lock().clone()
  }

  pub fn created_buckets(&self) -> usize {
    self.created_buckets.load(Ordering::SeqCst)
  }

  pub fn created_networks(&self) -> usize {
    self.created_networks.load(Ordering::SeqCst)
  }

  pub fn created_notebooks(&self) -> usize {
    self.created_notebooks.load(Ordering::SeqCst)
  }

  pub fn policy_writes(&self) -> usize {
    self.policy_writes.load(Ordering::SeqCst)
  }

  // --- Internals ---

  fn pending_operation(&self, target: String) -> Operation {
    let n = self.operation_seq.fetch_add(1, Ordering::SeqCst);
    Operation {
      name: format!("operation-{n}"),
      done: false,
      error: None,
      target: Some(target),
    }
  }

  fn check_storage(&self) -> ExternalResult<()> {
    match self.storage_failure.lock().clone() {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl ObjectStore for FakeCloud {
  async fn get_bucket(&self, bucket: &str) -> ExternalResult<BucketInfo> {
    self.check_storage()?;
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
    self.check_storage()?;
    let mut buckets = self.buckets.lock();
    if buckets.contains_key(bucket) {
      return Err(ExternalError::already_exists(format!("bucket {bucket}")));
    }
    buckets.insert(bucket.to_string(), location.to_string());
    self.created_buckets.fetch_add(1, Ordering::SeqCst);
    Ok(BucketInfo {
      name: bucket.to_string(),
      location: location.to_string(),
    })
  }

  async fn list_objects(&self, _bucket: &str, prefix: &str, max_results: usize) -> ExternalResult<Vec<ObjectInfo>> {
    self.check_storage()?;
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
    self.check_storage()?;
    self
      .objects
      .lock()
      .get(name)
      .cloned()
      .ok_or_else(|| ExternalError::not_found(format!("object {name}")))
  }
}

#[async_trait]
impl ServiceUsageClient for FakeCloud {
  async fn enable_service(&self, _project: &str, service: &str) -> ExternalResult<()> {
    match self.refused_services.lock().get(service) {
      Some(err) => Err(err.clone()),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl IamClient for FakeCloud {
  async fn get_service_account(&self, _project: &str, email: &str) -> ExternalResult<ServiceAccount> {
    if self.service_accounts.lock().contains(email) {
      Ok(ServiceAccount {
        email: email.to_string(),
        display_name: None,
      })
    } else {
      Err(ExternalError::not_found(format!("service account {email}")))
    }
  }

  async fn create_service_account(
    &self,
    project: &str,
    account_id: &str,
    display_name: &str,
  ) -> ExternalResult<ServiceAccount> {
    let email = format!("{account_id}@{project}.iam.gserviceaccount.com");
    if !self.service_accounts.lock().insert(email.clone()) {
      return Err(ExternalError::already_exists(format!("service account {email}")));
    }
    Ok(ServiceAccount {
      email,
      display_name: Some(display_name.to_string()),
    })
  }

  async fn get_policy(&self, _project: &str) -> ExternalResult<IamPolicy> {
    Ok(self.policy.lock().clone())
  }

  async fn set_policy(&self, _project: &str, policy: &IamPolicy) -> ExternalResult<IamPolicy> {
    *self.policy.lock() = policy.clone();
    self.policy_writes.fetch_add(1, Ordering::SeqCst);
    Ok(policy.clone())
  }
}

#[async_trait]
impl NetworkClient for FakeCloud {
  async fn get_network(&self, _project: &str, name: &str) -> ExternalResult<()> {
    if self.networks.lock().contains(name) {
      Ok(())
    } else {
      Err(ExternalError::not_found(format!("network {name}")))
    }
  }

  async fn insert_network(&self, project: &str, spec: &NetworkSpec) -> ExternalResult<Operation> {
    if !self.networks.lock().insert(spec.name.clone()) {
      return Err(ExternalError::already_exists(format!("network {}", spec.name)));
    }
    self.created_networks.fetch_add(1, Ordering::SeqCst);
    Ok(self.pending_operation(format!("projects/{project}/global/networks/{}", spec.name)))
  }

  async fn get_firewall(&self, _project: &str, name: &str) -> ExternalResult<()> {
    if self.firewalls.lock().contains(name) {
      Ok(())
    } else {
      Err(ExternalError::not_found(format!("firewall {name}")))
    }
  }

  async fn insert_firewall(&self, project: &str, spec: &FirewallSpec) -> ExternalResult<Operation> {
    if !self.firewalls.lock().insert(spec.name.clone()) {
      return Err(ExternalError::already_exists(format!("firewall {}", spec.name)));
    }
    Ok(self.pending_operation(format!("projects/{project}/global/firewalls/{}", spec.name)))
  }

  async fn get_router(&self, _project: &str, _region: &str, name: &str) -> ExternalResult<RouterInfo> {
    self
      .routers
      .lock()
      .get(name)
      .cloned()
      .ok_or_else(|| ExternalError::not_found(format!("router {name}")))
  }

  async fn insert_router(&self, project: &str, spec: &RouterSpec) -> ExternalResult<Operation> {
    let mut routers = self.routers.lock();
    if routers.contains_key(&spec.name) {
      return Err(ExternalError::already_exists(format!("router {}", spec.name)));
    }
    routers.insert(
      spec.name.clone(),
      RouterInfo {
        name: spec.name.clone(),
        nats: vec![spec.nat_name.clone()],
      },
    );
    Ok(self.pending_operation(format!("projects/{project}/regions/{}/routers/{}", spec.region, spec.name)))
  }

  async fn get_subnetwork(&self, _project: &str, _region: &str, name: &str) -> ExternalResult<SubnetworkInfo> {
    if let Some(err) = self.subnetwork_failure.lock().clone() {
      return Err(err);
    }
    Ok(SubnetworkInfo {
      name: name.to_string(),
      private_ip_google_access: *self.private_access.lock(),
    })
  }

  async fn enable_private_google_access(
    &self,
    project: &str,
    region: &str,
    subnetwork: &str,
  ) -> ExternalResult<Operation> {
    *self.private_access.lock() = true;
    Ok(self.pending_operation(format!("projects/{project}/regions/{region}/subnetworks/{subnetwork}")))
  }

  async fn get_operation(&self, _project: &str, _scope: &OperationScope, name: &str) -> ExternalResult<Operation> {
    Ok(Operation {
      name: name.to_string(),
      done: true,
      error: None,
      target: None,
    })
  }
}

#[async_trait]
impl NotebookClient for FakeCloud {
  async fn get_instance(&self, instance: &str) -> ExternalResult<NotebookInstance> {
    self
      .instances
      .lock()
      .get(instance)
      .cloned()
      .ok_or_else(|| ExternalError::not_found(format!("instance {instance}")))
  }

  async fn create_instance(&self, parent: &str, instance_id: &str, _spec: &NotebookSpec) -> ExternalResult<Operation> {
    let path = format!("{parent}/instances/{instance_id}");
    let mut instances = self.instances.lock();
    if instances.contains_key(&path) {
      return Err(ExternalError::already_exists(format!("instance {path}")));
    }
    instances.insert(
      path.clone(),
      NotebookInstance {
        name: path.clone(),
        state: "PROVISIONING".to_string(),
        proxy_uri: None,
      },
    );
    self.created_notebooks.fetch_add(1, Ordering::SeqCst);
    let op = self.pending_operation(path.clone());
    self.notebook_operations.lock().insert(op.name.clone(), path);
    Ok(op)
  }

  /// Every operation finishes on its first poll and activates its instance.
  async fn get_operation(&self, name: &str) -> ExternalResult<Operation> {
    let target = self.notebook_operations.lock().remove(name);
    if let Some(path) = &target {
      if let Some(instance) = self.instances.lock().get_mut(path) {
        instance.state = "ACTIVE".to_string();
        instance.proxy_uri = Some("abc123-dot-us-central1.notebooks.googleusercontent.com".to_string());
      }
    }
    Ok(Operation {
      name: name.to_string(),
      done: true,
      error: None,
      target,
    })
  }

  async fn list_operations(&self, _parent: &str) -> ExternalResult<Vec<Operation>> {
    Ok(
      self
        .notebook_operations
        .lock()
        .iter()
        .map(|(name, target)| Operation {
          name: name.clone(),
          done: false,
          error: None,
          target: Some(target.clone()),
        })
        .collect(),
    )
  }
}

#[async_trait]
impl BatchJobClient for FakeCloud {
  async fn list_jobs(&self, _parent: &str) -> ExternalResult<Vec<ExternalJob>> {
    match self.jobs_failure.lock().clone() {
      Some(err) => Err(err),
      None => Ok(self.jobs.lock().clone()),
    }
  }
}

pub fn collaborators(cloud: &Arc<FakeCloud>) -> Collaborators {
  Collaborators {
    storage: cloud.clone(),
    services: cloud.clone(),
    iam: cloud.clone(),
    network: cloud.clone(),
    notebooks: cloud.clone(),
    jobs: cloud.clone(),
  }
}

pub fn run_config() -> RunConfig {
  RunConfig::new(PROJECT, REGION)
}

pub fn app_config(steps: StepSettings) -> AppConfig {
  AppConfig {
    server_host: "127.0.0.1".to_string(),
    server_port: 0,
    log_format: crate::config::LogFormat::Pretty,
    run: run_config(),
    steps,
  }
}

pub fn step_env(cloud: Arc<FakeCloud>, steps: StepSettings) -> StepEnv {
  StepEnv::new(&app_config(steps), collaborators(&cloud))
}

pub async fn collect(stream: EventStream) -> Vec<Event> {
  stream.collect().await
}

pub fn messages(events: &[Event]) -> Vec<String> {
  events
    .iter()
    .filter_map(|ev| match ev {
      Event::Log { message, .. } => Some(message.clone()),
      _ => None,
    })
    .collect()
}

pub fn terminal_status(events: &[Event]) -> Option<TerminalStatus> {
  match events.last() {
    Some(Event::Terminal { status, .. }) => Some(*status),
    _ => None,
  }
}
