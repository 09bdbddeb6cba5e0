// nfviz/server/src/gcp/batch.rs

use super::GcpRest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nfviz::external::{BatchJobClient, ExternalJob};
use nfviz::ExternalResult;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{event, Level};

const BATCH_API: &str = "https://batch.googleapis.com/v1";
const PAGE_SIZE: &str = "200";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
  name: String,
  #[serde(default)]
  status: Option<JobStatus>,
  create_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
  #[serde(default)]
  state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobList {
  #[serde(default)]
  jobs: Vec<JobResource>,
  #[serde(default)]
  next_page_token: Option<String>,
}

impl From<JobResource> for ExternalJob {
  fn from(job: JobResource) -> Self {
    ExternalJob {
      name: job.name,
      state: job.status.map(|s| s.state).unwrap_or_else(|| "STATE_UNSPECIFIED".to_string()),
      create_time: job.create_time,
      task_label: None,
    }
  }
}

pub struct BatchJobs {
  rest: Arc<GcpRest>,
}

impl BatchJobs {
  pub fn new(rest: Arc<GcpRest>) -> Self {
    Self { rest }
  }
}

#[async_trait]
impl BatchJobClient for BatchJobs {
  async fn list_jobs(&self, parent: &str) -> ExternalResult<Vec<ExternalJob>> {
    let url = format!("{BATCH_API}/{parent}/jobs");
    let mut jobs = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
      let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
      if let Some(token) = page_token.take() {
        query.push(("pageToken", token));
      }
      let page: JobList = self.rest.get_json_query(&url, &query).await?;
      jobs.extend(page.jobs.into_iter().map(ExternalJob::from));
      match page.next_page_token {
        Some(token) if !token.is_empty() => page_token = Some(token),
        _ => break,
      }
    }
    event!(Level::DEBUG, %parent, count = jobs.len(), "Listed batch jobs.");
    Ok(jobs)
  }
}
