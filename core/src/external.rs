// nfviz/src/external.rs

//! Interfaces of the external systems this crate drives or reads.
//!
//! Implementations live outside the core (the server crate talks to the
//! Google Cloud REST APIs). Every method reports failures as an
//! [`ExternalError`] already classified into not-found / already-exists /
//! failed, which is all an idempotent step needs to decide what to do next.

use crate::error::ExternalResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Long-running operations
// ---------------------------------------------------------------------------

/// A provider long-running operation, reduced to what waiting needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Operation {
  pub name: String,
  pub done: bool,
  /// Set when the operation finished unsuccessfully.
  pub error: Option<String>,
  /// Resource the operation acts on, when the provider reports it.
  pub target: Option<String>,
}

/// Where a compute operation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationScope {
  Global,
  Region(String),
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
  pub name: String,
  pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
  pub name: String,
  pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
  async fn get_bucket(&self, bucket: &str) -> ExternalResult<BucketInfo>;

  async fn create_bucket(&self, bucket: &str, location: &str) -> ExternalResult<BucketInfo>;

  /// At most `max_results` objects whose name starts with `prefix`.
  async fn list_objects(&self, bucket: &str, prefix: &str, max_results: usize) -> ExternalResult<Vec<ObjectInfo>>;

  /// Reads a (small) object as UTF-8 text.
  async fn read_object(&self, bucket: &str, name: &str) -> ExternalResult<String>;
}

// ---------------------------------------------------------------------------
// API enablement
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ServiceUsageClient: Send + Sync {
  /// Enables `service` (e.g. `batch.googleapis.com`) on the project.
  async fn enable_service(&self, project: &str, service: &str) -> ExternalResult<()>;
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
  pub email: String,
  pub display_name: Option<String>,
}

/// One role binding. A binding with a `condition` only grants access when the
/// condition holds, so it never counts as granting the role outright.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyBinding {
  pub role: String,
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<serde_json::Value>,
  /// Fields this crate does not model; written back as read.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PolicyBinding {
  pub fn is_unconditional(&self) -> bool {
    self.condition.is_none()
  }
}

/// Project IAM policy. `etag` is passed back unchanged on update so
/// concurrent edits are rejected by the provider rather than lost.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IamPolicy {
  #[serde(default)]
  pub bindings: Vec<PolicyBinding>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub etag: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<i32>,
  /// e.g. `auditConfigs`; written back as read.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IamPolicy {
  /// Adds `member` to the unconditional binding of `role`, creating that
  /// binding if needed. Conditional bindings are left untouched. Returns
  /// whether the policy changed.
  pub fn grant(&mut self, role: &str, member: &str) -> bool {
    match self
      .bindings
      .iter_mut()
      .find(|b| b.role == role && b.is_unconditional())
    {
      Some(binding) if binding.members.iter().any(|m| m == member) => false,
      Some(binding) => {
        binding.members.push(member.to_string());
        true
      }
      None => {
        self.bindings.push(PolicyBinding {
          role: role.to_string(),
          members: vec![member.to_string()],
          ..PolicyBinding::default()
        });
        true
      }
    }
  }

  /// Whether `member` holds `role` unconditionally.
  pub fn has_member(&self, role: &str, member: &str) -> bool {
    self
      .bindings
      .iter()
      .any(|b| b.role == role && b.is_unconditional() && b.members.iter().any(|m| m == member))
  }
}

#[async_trait]
pub trait IamClient: Send + Sync {
  async fn get_service_account(&self, project: &str, email: &str) -> ExternalResult<ServiceAccount>;

  async fn create_service_account(
    &self,
    project: &str,
    account_id: &str,
    display_name: &str,
  ) -> ExternalResult<ServiceAccount>;

  async fn get_policy(&self, project: &str) -> ExternalResult<IamPolicy>;

  async fn set_policy(&self, project: &str, policy: &IamPolicy) -> ExternalResult<IamPolicy>;
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
  pub name: String,
  pub auto_create_subnetworks: bool,
  /// `REGIONAL` or `GLOBAL`.
  pub routing_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallSpec {
  pub name: String,
  /// Full network path, `projects/P/global/networks/N`.
  pub network: String,
  pub direction: String,
  pub priority: u32,
  pub allowed_protocols: Vec<String>,
  pub source_ranges: Vec<String>,
}

/// A Cloud Router together with the NAT configuration it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSpec {
  pub name: String,
  pub region: String,
  pub network: String,
  pub nat_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInfo {
  pub name: String,
  /// Names of the NAT configurations on the router.
  pub nats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetworkInfo {
  pub name: String,
  pub private_ip_google_access: bool,
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
  async fn get_network(&self, project: &str, name: &str) -> ExternalResult<()>;

  async fn insert_network(&self, project: &str, spec: &NetworkSpec) -> ExternalResult<Operation>;

  async fn get_firewall(&self, project: &str, name: &str) -> ExternalResult<()>;

  async fn insert_firewall(&self, project: &str, spec: &FirewallSpec) -> ExternalResult<Operation>;

  async fn get_router(&self, project: &str, region: &str, name: &str) -> ExternalResult<RouterInfo>;

  async fn insert_router(&self, project: &str, spec: &RouterSpec) -> ExternalResult<Operation>;

  async fn get_subnetwork(&self, project: &str, region: &str, name: &str) -> ExternalResult<SubnetworkInfo>;

  async fn enable_private_google_access(&self, project: &str, region: &str, subnetwork: &str)
    -> ExternalResult<Operation>;

  async fn get_operation(&self, project: &str, scope: &OperationScope, name: &str) -> ExternalResult<Operation>;
}

// ---------------------------------------------------------------------------
// Managed notebook environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookInstance {
  pub name: String,
  /// Provider-native state, e.g. `PROVISIONING`, `ACTIVE`, `STOPPED`.
  pub state: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proxy_uri: Option<String>,
}

impl NotebookInstance {
  pub fn is_active(&self) -> bool {
    self.state == "ACTIVE"
  }

  pub fn is_provisioning(&self) -> bool {
    matches!(self.state.as_str(), "PROVISIONING" | "STARTING" | "INITIALIZING")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSpec {
  pub machine_type: String,
  pub service_account_email: String,
  pub network: String,
  pub subnetwork: String,
  pub disable_public_ip: bool,
}

#[async_trait]
pub trait NotebookClient: Send + Sync {
  /// `instance` is the full path `projects/P/locations/Z/instances/N`.
  async fn get_instance(&self, instance: &str) -> ExternalResult<NotebookInstance>;

  async fn create_instance(&self, parent: &str, instance_id: &str, spec: &NotebookSpec) -> ExternalResult<Operation>;

  async fn get_operation(&self, name: &str) -> ExternalResult<Operation>;

  async fn list_operations(&self, parent: &str) -> ExternalResult<Vec<Operation>>;
}

// ---------------------------------------------------------------------------
// Batch jobs
// ---------------------------------------------------------------------------

/// One entry of the external batch job listing. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalJob {
  /// Full resource name or short id; only the last path segment is matched.
  pub name: String,
  /// Provider-native state, e.g. `QUEUED`, `SCHEDULED`, `RUNNING`, `SUCCEEDED`.
  pub state: String,
  pub create_time: DateTime<Utc>,
  /// Process label, when the provider (or a previous lookup) knows it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_label: Option<String>,
}

impl ExternalJob {
  pub fn short_name(&self) -> &str {
    self.name.rsplit('/').next().unwrap_or(&self.name)
  }
}

#[async_trait]
pub trait BatchJobClient: Send + Sync {
  /// Every job under `parent` (`projects/P/locations/R`).
  async fn list_jobs(&self, parent: &str) -> ExternalResult<Vec<ExternalJob>>;
}

// ---------------------------------------------------------------------------

/// The full set of collaborators, cheap to clone into step contexts.
#[derive(Clone)]
pub struct Collaborators {
  pub storage: Arc<dyn ObjectStore>,
  pub services: Arc<dyn ServiceUsageClient>,
  pub iam: Arc<dyn IamClient>,
  pub network: Arc<dyn NetworkClient>,
  pub notebooks: Arc<dyn NotebookClient>,
  pub jobs: Arc<dyn BatchJobClient>,
}

impl std::fmt::Debug for Collaborators {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Collaborators").finish_non_exhaustive()
  }
}
