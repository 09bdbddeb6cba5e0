// nfviz/server/src/gcp/service_usage.rs

use super::GcpRest;
use async_trait::async_trait;
use nfviz::external::ServiceUsageClient;
use nfviz::ExternalResult;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ServiceUsage {
  rest: Arc<GcpRest>,
}

impl ServiceUsage {
  pub fn new(rest: Arc<GcpRest>) -> Self {
    Self { rest }
  }
}

#[async_trait]
impl ServiceUsageClient for ServiceUsage {
  /// Enabling an already enabled service succeeds, so no existence check is
  /// needed. The returned operation is not awaited.
  async fn enable_service(&self, project: &str, service: &str) -> ExternalResult<()> {
    let url = format!("https://serviceusage.googleapis.com/v1/projects/{project}/services/{service}:enable");
    let _operation: Value = self.rest.send_json(Method::POST, &url, &json!({})).await?;
    Ok(())
  }
}
