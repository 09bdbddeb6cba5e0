// nfviz/server/src/gcp/mod.rs

//! Google Cloud REST implementations of the `nfviz::external` collaborator
//! traits. Every client shares one [`GcpRest`] (HTTP client + token provider).

pub mod batch;
pub mod compute;
pub mod iam;
pub mod notebooks;
pub mod service_usage;
pub mod storage;

use crate::config::AppConfig;
use gcp_auth::TokenProvider;
use nfviz::{Collaborators, ExternalError, ExternalResult};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, instrument, Level};

const CLOUD_PLATFORM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Error body returned by Google APIs.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
  error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
  #[serde(default)]
  message: String,
  #[serde(default)]
  status: Option<String>,
}

pub struct GcpRest {
  http: reqwest::Client,
  tokens: Arc<dyn TokenProvider>,
}

impl GcpRest {
  /// Discovers credentials from the environment (service account key,
  /// metadata server or gcloud user credentials).
  pub async fn from_environment() -> anyhow::Result<Self> {
    let tokens = gcp_auth::provider()
      .await
      .map_err(|e| anyhow::anyhow!("Failed to initialize GCP auth: {e}"))?;
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
    Ok(Self { http, tokens })
  }

  async fn access_token(&self) -> ExternalResult<String> {
    let token = self
      .tokens
      .token(CLOUD_PLATFORM_SCOPES)
      .await
      .map_err(|e| ExternalError::failed(format!("Failed to get GCP access token: {e}")))?;
    Ok(token.as_str().to_string())
  }

  async fn request(&self, method: Method, url: &str) -> ExternalResult<reqwest::RequestBuilder> {
    let token = self.access_token().await?;
    Ok(self.http.request(method, url).bearer_auth(token))
  }

  #[instrument(name = "gcp::get", skip(self), level = "debug", err(Display))]
  pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ExternalResult<T> {
    let response = send(self.request(Method::GET, url).await?, url).await?;
    decode_json(response, url).await
  }

  #[instrument(name = "gcp::get", skip(self, query), level = "debug", err(Display))]
  pub async fn get_json_query<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> ExternalResult<T> {
    let response = send(self.request(Method::GET, url).await?.query(query), url).await?;
    decode_json(response, url).await
  }

  #[instrument(name = "gcp::send", skip(self, body), level = "debug", err(Display))]
  pub async fn send_json<B, T>(&self, method: Method, url: &str, body: &B) -> ExternalResult<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let response = send(self.request(method, url).await?.json(body), url).await?;
    decode_json(response, url).await
  }

  #[instrument(name = "gcp::get_text", skip(self), level = "debug", err(Display))]
  pub async fn get_text(&self, url: &str) -> ExternalResult<String> {
    let response = send(self.request(Method::GET, url).await?, url).await?;
    let response = check_status(response).await?;
    response
      .text()
      .await
      .map_err(|e| ExternalError::failed(format!("Failed to read response from {url}: {e}")))
  }
}

async fn send(request: reqwest::RequestBuilder, url: &str) -> ExternalResult<reqwest::Response> {
  request
    .send()
    .await
    .map_err(|e| ExternalError::failed(format!("Request to {url} failed: {e}")))
}

/// Turns a non-2xx response into an `ExternalError` classified by status.
async fn check_status(response: reqwest::Response) -> ExternalResult<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  let message = match serde_json::from_str::<GoogleErrorResponse>(&body) {
    Ok(parsed) => match parsed.error.status {
      Some(code) if !code.is_empty() => format!("{code}: {}", parsed.error.message),
      _ => parsed.error.message,
    },
    Err(_) if body.is_empty() => status.canonical_reason().unwrap_or("no body").to_string(),
    Err(_) => body,
  };
  event!(Level::DEBUG, status = status.as_u16(), %message, "Google API returned an error.");
  Err(ExternalError::from_status(status.as_u16(), message))
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> ExternalResult<T> {
  let response = check_status(response).await?;
  response
    .json::<T>()
    .await
    .map_err(|e| ExternalError::failed(format!("Unexpected response from {url}: {e}")))
}

/// Builds every collaborator on top of one shared REST client.
pub fn collaborators(rest: Arc<GcpRest>, config: &AppConfig) -> Collaborators {
  Collaborators {
    storage: Arc::new(storage::GcsStore::new(rest.clone(), &config.run.project_id)),
    services: Arc::new(service_usage::ServiceUsage::new(rest.clone())),
    iam: Arc::new(iam::Iam::new(rest.clone())),
    network: Arc::new(compute::ComputeNetworks::new(rest.clone())),
    notebooks: Arc::new(notebooks::Workbench::new(rest.clone())),
    jobs: Arc::new(batch::BatchJobs::new(rest)),
  }
}
