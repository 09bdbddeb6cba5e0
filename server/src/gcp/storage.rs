// nfviz/server/src/gcp/storage.rs

use super::GcpRest;
use async_trait::async_trait;
use nfviz::external::{BucketInfo, ObjectInfo, ObjectStore};
use nfviz::{ExternalError, ExternalResult};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1";

#[derive(Debug, Deserialize)]
struct BucketResource {
  name: String,
  #[serde(default)]
  location: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
  name: String,
  /// The JSON API reports sizes as decimal strings.
  #[serde(default)]
  size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
  #[serde(default)]
  items: Vec<ObjectResource>,
}

pub struct GcsStore {
  rest: Arc<GcpRest>,
  project_id: String,
}

impl GcsStore {
  pub fn new(rest: Arc<GcpRest>, project_id: &str) -> Self {
    Self {
      rest,
      project_id: project_id.to_string(),
    }
  }
}

/// URL with each of `segments` appended as a single percent-encoded path
/// segment (object names contain `/`).
fn api_url(segments: &[&str]) -> ExternalResult<Url> {
  let mut url = Url::parse(STORAGE_API).map_err(|e| ExternalError::failed(format!("Bad storage URL: {e}")))?;
  url
    .path_segments_mut()
    .map_err(|_| ExternalError::failed("Storage URL cannot be a base"))?
    .extend(segments);
  Ok(url)
}

#[async_trait]
impl ObjectStore for GcsStore {
  async fn get_bucket(&self, bucket: &str) -> ExternalResult<BucketInfo> {
    let url = api_url(&["b", bucket])?;
    let resource: BucketResource = self.rest.get_json(url.as_str()).await?;
    Ok(BucketInfo {
      name: resource.name,
      location: resource.location,
    })
  }

  async fn create_bucket(&self, bucket: &str, location: &str) -> ExternalResult<BucketInfo> {
    let mut url = api_url(&["b"])?;
    url.query_pairs_mut().append_pair("project", &self.project_id);
    let body = json!({
      "name": bucket,
      "location": location,
      "iamConfiguration": { "uniformBucketLevelAccess": { "enabled": true } },
    });
    let resource: BucketResource = self.rest.send_json(Method::POST, url.as_str(), &body).await?;
    Ok(BucketInfo {
      name: resource.name,
      location: resource.location,
    })
  }

  async fn list_objects(&self, bucket: &str, prefix: &str, max_results: usize) -> ExternalResult<Vec<ObjectInfo>> {
    let url = api_url(&["b", bucket, "o"])?;
    let query = [("prefix", prefix.to_string()), ("maxResults", max_results.to_string())];
    let list: ObjectList = self.rest.get_json_query(url.as_str(), &query).await?;
    Ok(
      list
        .items
        .into_iter()
        .take(max_results)
        .map(|o| ObjectInfo {
          size: o.size.and_then(|s| s.parse().ok()).unwrap_or(0),
          name: o.name,
        })
        .collect(),
    )
  }

  async fn read_object(&self, bucket: &str, name: &str) -> ExternalResult<String> {
    let mut url = api_url(&["b", bucket, "o", name])?;
    url.query_pairs_mut().append_pair("alt", "media");
    self.rest.get_text(url.as_str()).await
  }
}
