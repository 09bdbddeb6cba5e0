// nfviz/src/aggregate.rs

//! Combined Status Aggregator: one best-effort snapshot across storage, batch
//! jobs and the managed notebook environment.

use crate::config::RunConfig;
use crate::external::{Collaborators, NotebookClient, ObjectStore};
use crate::reconcile::{JobReconciler, JobsReport};
use chrono::{DateTime, Utc};
use futures_util::future::join3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Result of one sub-query: the value when it could be read, otherwise the
/// error. Serializes flat, as the value's fields plus an optional `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe<T> {
  #[serde(flatten)]
  pub value: Option<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl<T> Probe<T> {
  pub fn ok(value: T) -> Self {
    Self {
      value: Some(value),
      error: None,
    }
  }

  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      value: None,
      error: Some(error.into()),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.error.is_none()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketState {
  pub name: String,
  pub exists: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
  pub name: String,
  /// Provider state, or `NOT_FOUND` when the instance does not exist.
  pub state: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proxy_uri: Option<String>,
}

/// Built fresh for every request and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
  pub bucket: Probe<BucketState>,
  pub jobs: JobsReport,
  pub environment: Probe<EnvironmentState>,
  pub pipeline_running: bool,
  pub all_complete: bool,
  pub checked_at: DateTime<Utc>,
}

pub struct StatusAggregator {
  config: Arc<RunConfig>,
  storage: Arc<dyn ObjectStore>,
  notebooks: Arc<dyn NotebookClient>,
  reconciler: JobReconciler,
}

impl StatusAggregator {
  pub fn new(config: Arc<RunConfig>, collaborators: &Collaborators) -> Self {
    Self {
      reconciler: JobReconciler::new(config.clone(), collaborators.jobs.clone(), collaborators.storage.clone()),
      storage: collaborators.storage.clone(),
      notebooks: collaborators.notebooks.clone(),
      config,
    }
  }

  pub fn reconciler(&self) -> &JobReconciler {
    &self.reconciler
  }

  /// Runs the three sub-queries concurrently. A failing sub-query only marks
  /// its own field; no retries happen here.
  #[instrument(name = "StatusAggregator::snapshot", skip_all)]
  pub async fn snapshot(&self) -> AggregateSnapshot {
    let (bucket, jobs, environment) = join3(self.bucket_state(), self.reconciler.report(), self.environment_state()).await;

    event!(
      Level::DEBUG,
      bucket_ok = bucket.is_ok(),
      jobs_ok = jobs.error.is_none(),
      environment_ok = environment.is_ok(),
      "Snapshot assembled."
    );
    AggregateSnapshot {
      pipeline_running: jobs.pipeline_running,
      all_complete: jobs.all_complete,
      bucket,
      jobs,
      environment,
      checked_at: Utc::now(),
    }
  }

  async fn bucket_state(&self) -> Probe<BucketState> {
    let name = self.config.bucket_name.clone();
    match self.storage.get_bucket(&name).await {
      Ok(info) => Probe::ok(BucketState {
        name,
        exists: true,
        location: Some(info.location),
      }),
      Err(err) if err.is_not_found() => Probe::ok(BucketState {
        name,
        exists: false,
        location: None,
      }),
      Err(err) => {
        event!(Level::WARN, error = %err, "Bucket query failed.");
        Probe::failed(err.to_string())
      }
    }
  }

  async fn environment_state(&self) -> Probe<EnvironmentState> {
    let name = self.config.notebook_name.clone();
    match self.notebooks.get_instance(&self.config.notebook_instance_path()).await {
      Ok(instance) => Probe::ok(EnvironmentState {
        name,
        state: instance.state,
        proxy_uri: instance.proxy_uri,
      }),
      Err(err) if err.is_not_found() => Probe::ok(EnvironmentState {
        name,
        state: "NOT_FOUND".to_string(),
        proxy_uri: None,
      }),
      Err(err) => {
        event!(Level::WARN, error = %err, "Notebook environment query failed.");
        Probe::failed(err.to_string())
      }
    }
  }
}
