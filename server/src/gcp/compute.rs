// nfviz/server/src/gcp/compute.rs

use super::GcpRest;
use async_trait::async_trait;
use nfviz::external::{
  FirewallSpec, NetworkClient, NetworkSpec, Operation, OperationScope, RouterInfo, RouterSpec, SubnetworkInfo,
};
use nfviz::ExternalResult;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";

/// Compute Engine operation resource (`status` is PENDING, RUNNING or DONE).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeOperation {
  name: String,
  #[serde(default)]
  status: String,
  #[serde(default)]
  error: Option<ComputeOperationError>,
  #[serde(default)]
  target_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComputeOperationError {
  #[serde(default)]
  errors: Vec<ComputeErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ComputeErrorItem {
  #[serde(default)]
  message: String,
}

impl From<ComputeOperation> for Operation {
  fn from(op: ComputeOperation) -> Self {
    let error = op.error.and_then(|e| {
      let messages: Vec<String> = e.errors.into_iter().map(|i| i.message).filter(|m| !m.is_empty()).collect();
      (!messages.is_empty()).then(|| messages.join("; "))
    });
    Operation {
      name: op.name,
      done: op.status == "DONE",
      error,
      target: op.target_link,
    }
  }
}

#[derive(Debug, Deserialize)]
struct RouterResource {
  name: String,
  #[serde(default)]
  nats: Vec<NatResource>,
}

#[derive(Debug, Deserialize)]
struct NatResource {
  name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubnetworkResource {
  name: String,
  #[serde(default)]
  private_ip_google_access: bool,
}

pub struct ComputeNetworks {
  rest: Arc<GcpRest>,
}

impl ComputeNetworks {
  pub fn new(rest: Arc<GcpRest>) -> Self {
    Self { rest }
  }

  async fn insert(&self, url: &str, body: &Value) -> ExternalResult<Operation> {
    let op: ComputeOperation = self.rest.send_json(Method::POST, url, body).await?;
    Ok(op.into())
  }
}

#[async_trait]
impl NetworkClient for ComputeNetworks {
  async fn get_network(&self, project: &str, name: &str) -> ExternalResult<()> {
    let _network: Value = self
      .rest
      .get_json(&format!("{COMPUTE_API}/projects/{project}/global/networks/{name}"))
      .await?;
    Ok(())
  }

  async fn insert_network(&self, project: &str, spec: &NetworkSpec) -> ExternalResult<Operation> {
    let body = json!({
      "name": spec.name,
      "autoCreateSubnetworks": spec.auto_create_subnetworks,
      "routingConfig": { "routingMode": spec.routing_mode },
    });
    self
      .insert(&format!("{COMPUTE_API}/projects/{project}/global/networks"), &body)
      .await
  }

  async fn get_firewall(&self, project: &str, name: &str) -> ExternalResult<()> {
    let _firewall: Value = self
      .rest
      .get_json(&format!("{COMPUTE_API}/projects/{project}/global/firewalls/{name}"))
      .await?;
    Ok(())
  }

  async fn insert_firewall(&self, project: &str, spec: &FirewallSpec) -> ExternalResult<Operation> {
    let allowed: Vec<Value> = spec
      .allowed_protocols
      .iter()
      .map(|p| json!({ "IPProtocol": p }))
      .collect();
    let body = json!({
      "name": spec.name,
      "network": spec.network,
      "direction": spec.direction,
      "priority": spec.priority,
      "allowed": allowed,
      "sourceRanges": spec.source_ranges,
    });
    self
      .insert(&format!("{COMPUTE_API}/projects/{project}/global/firewalls"), &body)
      .await
  }

  async fn get_router(&self, project: &str, region: &str, name: &str) -> ExternalResult<RouterInfo> {
    let router: RouterResource = self
      .rest
      .get_json(&format!("{COMPUTE_API}/projects/{project}/regions/{region}/routers/{name}"))
      .await?;
    Ok(RouterInfo {
      name: router.name,
      nats: router.nats.into_iter().map(|n| n.name).collect(),
    })
  }

  async fn insert_router(&self, project: &str, spec: &RouterSpec) -> ExternalResult<Operation> {
    let body = json!({
      "name": spec.name,
      "network": spec.network,
      "nats": [{
        "name": spec.nat_name,
        "natIpAllocateOption": "AUTO_ONLY",
        "sourceSubnetworkIpRangesToNat": "ALL_SUBNETWORKS_ALL_IP_RANGES",
      }],
    });
    self
      .insert(
        &format!("{COMPUTE_API}/projects/{project}/regions/{}/routers", spec.region),
        &body,
      )
      .await
  }

  async fn get_subnetwork(&self, project: &str, region: &str, name: &str) -> ExternalResult<SubnetworkInfo> {
    let subnet: SubnetworkResource = self
      .rest
      .get_json(&format!("{COMPUTE_API}/projects/{project}/regions/{region}/subnetworks/{name}"))
      .await?;
    Ok(SubnetworkInfo {
      name: subnet.name,
      private_ip_google_access: subnet.private_ip_google_access,
    })
  }

  async fn enable_private_google_access(
    &self,
    project: &str,
    region: &str,
    subnetwork: &str,
  ) -> ExternalResult<Operation> {
    let url =
      format!("{COMPUTE_API}/projects/{project}/regions/{region}/subnetworks/{subnetwork}/setPrivateIpGoogleAccess");
    self.insert(&url, &json!({ "privateIpGoogleAccess": true })).await
  }

  async fn get_operation(&self, project: &str, scope: &OperationScope, name: &str) -> ExternalResult<Operation> {
    let url = match scope {
      OperationScope::Global => format!("{COMPUTE_API}/projects/{project}/global/operations/{name}"),
      OperationScope::Region(region) => format!("{COMPUTE_API}/projects/{project}/regions/{region}/operations/{name}"),
    };
    let op: ComputeOperation = self.rest.get_json(&url).await?;
    Ok(op.into())
  }
}
