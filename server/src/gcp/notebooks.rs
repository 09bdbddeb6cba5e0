// nfviz/server/src/gcp/notebooks.rs

use super::GcpRest;
use async_trait::async_trait;
use nfviz::external::{NotebookClient, NotebookInstance, NotebookSpec, Operation};
use nfviz::ExternalResult;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const NOTEBOOKS_API: &str = "https://notebooks.googleapis.com/v2";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceResource {
  name: String,
  #[serde(default)]
  state: String,
  #[serde(default)]
  proxy_uri: Option<String>,
}

/// google.longrunning.Operation
#[derive(Debug, Deserialize)]
struct LongRunningOperation {
  name: String,
  #[serde(default)]
  done: bool,
  #[serde(default)]
  error: Option<LroStatus>,
  #[serde(default)]
  metadata: Option<LroMetadata>,
}

#[derive(Debug, Deserialize)]
struct LroStatus {
  #[serde(default)]
  message: String,
}

#[derive(Debug, Deserialize)]
struct LroMetadata {
  #[serde(default)]
  target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationList {
  #[serde(default)]
  operations: Vec<LongRunningOperation>,
}

impl From<LongRunningOperation> for Operation {
  fn from(op: LongRunningOperation) -> Self {
    Operation {
      name: op.name,
      done: op.done,
      error: op.error.map(|e| e.message),
      target: op.metadata.and_then(|m| m.target),
    }
  }
}

pub struct Workbench {
  rest: Arc<GcpRest>,
}

impl Workbench {
  pub fn new(rest: Arc<GcpRest>) -> Self {
    Self { rest }
  }
}

#[async_trait]
impl NotebookClient for Workbench {
  async fn get_instance(&self, instance: &str) -> ExternalResult<NotebookInstance> {
    let resource: InstanceResource = self.rest.get_json(&format!("{NOTEBOOKS_API}/{instance}")).await?;
    Ok(NotebookInstance {
      name: resource.name,
      state: resource.state,
      proxy_uri: resource.proxy_uri,
    })
  }

  async fn create_instance(&self, parent: &str, instance_id: &str, spec: &NotebookSpec) -> ExternalResult<Operation> {
    let url = format!("{NOTEBOOKS_API}/{parent}/instances?instanceId={instance_id}");
    let body = json!({
      "gceSetup": {
        "machineType": spec.machine_type,
        "serviceAccounts": [{ "email": spec.service_account_email }],
        "networkInterfaces": [{ "network": spec.network, "subnet": spec.subnetwork }],
        "disablePublicIp": spec.disable_public_ip,
      },
    });
    let op: LongRunningOperation = self.rest.send_json(Method::POST, &url, &body).await?;
    Ok(op.into())
  }

  async fn get_operation(&self, name: &str) -> ExternalResult<Operation> {
    let op: LongRunningOperation = self.rest.get_json(&format!("{NOTEBOOKS_API}/{name}")).await?;
    Ok(op.into())
  }

  async fn list_operations(&self, parent: &str) -> ExternalResult<Vec<Operation>> {
    let list: OperationList = self.rest.get_json(&format!("{NOTEBOOKS_API}/{parent}/operations")).await?;
    Ok(list.operations.into_iter().map(Operation::from).collect())
  }
}
