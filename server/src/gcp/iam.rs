// nfviz/server/src/gcp/iam.rs

use super::GcpRest;
use async_trait::async_trait;
use nfviz::external::{IamClient, IamPolicy, ServiceAccount};
use nfviz::ExternalResult;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const IAM_API: &str = "https://iam.googleapis.com/v1";
const CRM_API: &str = "https://cloudresourcemanager.googleapis.com/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAccountResource {
  email: String,
  #[serde(default)]
  display_name: Option<String>,
}

impl From<ServiceAccountResource> for ServiceAccount {
  fn from(r: ServiceAccountResource) -> Self {
    ServiceAccount {
      email: r.email,
      display_name: r.display_name,
    }
  }
}

pub struct Iam {
  rest: Arc<GcpRest>,
}

impl Iam {
  pub fn new(rest: Arc<GcpRest>) -> Self {
    Self { rest }
  }
}

#[async_trait]
impl IamClient for Iam {
  async fn get_service_account(&self, project: &str, email: &str) -> ExternalResult<ServiceAccount> {
    let url = format!("{IAM_API}/projects/{project}/serviceAccounts/{email}");
    let resource: ServiceAccountResource = self.rest.get_json(&url).await?;
    Ok(resource.into())
  }

  async fn create_service_account(
    &self,
    project: &str,
    account_id: &str,
    display_name: &str,
  ) -> ExternalResult<ServiceAccount> {
    let url = format!("{IAM_API}/projects/{project}/serviceAccounts");
    let body = json!({
      "accountId": account_id,
      "serviceAccount": { "displayName": display_name },
    });
    let resource: ServiceAccountResource = self.rest.send_json(Method::POST, &url, &body).await?;
    Ok(resource.into())
  }

  async fn get_policy(&self, project: &str) -> ExternalResult<IamPolicy> {
    let url = format!("{CRM_API}/projects/{project}:getIamPolicy");
    let body = json!({ "options": { "requestedPolicyVersion": 3 } });
    self.rest.send_json(Method::POST, &url, &body).await
  }

  async fn set_policy(&self, project: &str, policy: &IamPolicy) -> ExternalResult<IamPolicy> {
    let url = format!("{CRM_API}/projects/{project}:setIamPolicy");
    let body = json!({ "policy": policy });
    self.rest.send_json(Method::POST, &url, &body).await
  }
}
