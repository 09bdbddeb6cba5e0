// nfviz/src/reconcile.rs

//! Job State Reconciler: folds the external batch-job listing into a
//! [`StatusMap`].
//!
//! The reconciler owns no state. Each call reads the listing, keeps the jobs
//! that belong to the pipeline, orders them newest first and applies their
//! states through [`StatusMap::observe`], so a retried task that already
//! succeeded is never pulled back to `running`.

use crate::config::RunConfig;
use crate::external::{BatchJobClient, ExternalJob, ObjectStore};
use crate::status::{StatusMap, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Marker line written at the top of every task's `.command.run` script.
const TASK_HEADER: &str = "# NEXTFLOW TASK:";
const COMMAND_RUN: &str = "/.command.run";
const ARTIFACT_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsReport {
  pub tasks: StatusMap,
  pub pipeline_running: bool,
  pub all_complete: bool,
  /// Jobs that belong to the pipeline, whether or not they resolved to a task.
  pub job_count: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl JobsReport {
  pub fn from_map(tasks: StatusMap, job_count: usize) -> Self {
    Self {
      pipeline_running: tasks.pipeline_running(),
      all_complete: tasks.all_complete(),
      tasks,
      job_count,
      error: None,
    }
  }

  /// All-pending report carrying `error`; what callers get when the listing
  /// cannot be read.
  pub fn unavailable(error: impl Into<String>) -> Self {
    Self {
      error: Some(error.into()),
      ..Self::from_map(StatusMap::new(), 0)
    }
  }
}

/// Fixed provider-state table.
pub fn job_state_status(state: &str) -> TaskStatus {
  match state.to_ascii_uppercase().as_str() {
    "SUCCEEDED" => TaskStatus::Complete,
    "RUNNING" | "SCHEDULED" => TaskStatus::Running,
    _ => TaskStatus::Pending,
  }
}

/// Extracts the label from a `# NEXTFLOW TASK: <label>` header line.
pub fn parse_task_header(script: &str) -> Option<&str> {
  script
    .lines()
    .take(20)
    .find_map(|line| line.trim().strip_prefix(TASK_HEADER))
    .map(str::trim)
    .filter(|label| !label.is_empty())
}

pub struct JobReconciler {
  config: Arc<RunConfig>,
  jobs: Arc<dyn BatchJobClient>,
  storage: Arc<dyn ObjectStore>,
}

impl JobReconciler {
  pub fn new(config: Arc<RunConfig>, jobs: Arc<dyn BatchJobClient>, storage: Arc<dyn ObjectStore>) -> Self {
    Self { config, jobs, storage }
  }

  /// Lists jobs and reconciles them. Never fails: an unreachable listing
  /// yields an all-pending report with `error` set.
  #[instrument(name = "JobReconciler::report", skip_all, fields(parent = tracing::field::Empty))]
  pub async fn report(&self) -> JobsReport {
    let parent = self.config.batch_parent();
    tracing::Span::current().record("parent", parent.as_str());
    match self.jobs.list_jobs(&parent).await {
      Ok(jobs) => self.reconcile(&jobs).await,
      Err(err) => {
        event!(Level::WARN, error = %err, "Batch job listing unavailable.");
        JobsReport::unavailable(err.to_string())
      }
    }
  }

  /// Folds `jobs` into a fresh status map.
  pub async fn reconcile(&self, jobs: &[ExternalJob]) -> JobsReport {
    let mut owned: Vec<&ExternalJob> = jobs
      .iter()
      .filter(|job| job.short_name().starts_with(&self.config.job_prefix))
      .collect();
    owned.sort_by(|a, b| b.create_time.cmp(&a.create_time));

    let mut tasks = StatusMap::new();
    for job in &owned {
      match self.resolve_task(job).await {
        Some(task) => {
          let status = job_state_status(&job.state);
          let changed = tasks.observe(task, status);
          event!(Level::TRACE, job = job.short_name(), %task, %status, changed, "Job observed.");
        }
        None => {
          event!(Level::DEBUG, job = job.short_name(), state = %job.state, "Job does not map to a known task; dropped.");
        }
      }
    }
    tasks.derive_results();

    JobsReport::from_map(tasks, owned.len())
  }

  async fn resolve_task(&self, job: &ExternalJob) -> Option<TaskId> {
    if let Some(task) = job.task_label.as_deref().and_then(TaskId::from_label) {
      return Some(task);
    }
    if let Some(task) = TaskId::find_substring_in(job.short_name()) {
      return Some(task);
    }
    self.task_from_artifact(job).await
  }

  /// Reads the task label from the job's `.command.run` in the work directory.
  async fn task_from_artifact(&self, job: &ExternalJob) -> Option<TaskId> {
    let hash = work_hash(job.short_name(), &self.config.job_prefix)?;
    let prefix = work_dir_prefix(&self.config.work_prefix, hash);

    let objects = match self
      .storage
      .list_objects(&self.config.bucket_name, &prefix, ARTIFACT_LIST_LIMIT)
      .await
    {
      Ok(objects) => objects,
      Err(err) => {
        event!(Level::DEBUG, %prefix, error = %err, "Work directory listing failed.");
        return None;
      }
    };
    let script = objects.iter().find(|o| o.name.ends_with(COMMAND_RUN))?;

    match self.storage.read_object(&self.config.bucket_name, &script.name).await {
      Ok(text) => parse_task_header(&text).and_then(TaskId::from_label),
      Err(err) => {
        event!(Level::DEBUG, object = %script.name, error = %err, "Task script unreadable.");
        None
      }
    }
  }
}

/// `nf-ab12cd34-1712345678` → `ab12cd34`.
fn work_hash<'a>(short_name: &'a str, job_prefix: &str) -> Option<&'a str> {
  let rest = short_name.strip_prefix(job_prefix)?;
  let hash = rest.split('-').next()?;
  (hash.len() >= 8 && hash.chars().all(|c| c.is_ascii_hexdigit())).then_some(hash)
}

/// Work directories are laid out as `<prefix>/<hash[0..2]>/<hash[2..]>`; the
/// first eight hash characters are enough to locate one.
fn work_dir_prefix(work_prefix: &str, hash: &str) -> String {
  let hash = hash.to_ascii_lowercase();
  let end = hash.len().min(8);
  format!("{}/{}/{}", work_prefix.trim_end_matches('/'), &hash[..2], &hash[2..end])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_table() {
    assert_eq!(job_state_status("SUCCEEDED"), TaskStatus::Complete);
    assert_eq!(job_state_status("running"), TaskStatus::Running);
    assert_eq!(job_state_status("SCHEDULED"), TaskStatus::Running);
    assert_eq!(job_state_status("FAILED"), TaskStatus::Pending);
    assert_eq!(job_state_status("QUEUED"), TaskStatus::Pending);
  }

  #[test]
  fn header_parsing() {
    let script = "#!/bin/bash\n# NEXTFLOW TASK: RNASEQ:QUANT (ggal_gut)\nset -e\n";
    assert_eq!(parse_task_header(script), Some("RNASEQ:QUANT (ggal_gut)"));
    assert_eq!(parse_task_header("#!/bin/bash\necho hi\n"), None);
  }

  #[test]
  fn work_dir_from_job_name() {
    assert_eq!(work_hash("nf-ab12cd34-1712345678", "nf-"), Some("ab12cd34"));
    assert_eq!(work_hash("nf-FASTQC-1", "nf-"), None);
    assert_eq!(work_dir_prefix("scratch/", "AB12CD34"), "scratch/ab/12cd34");
  }
}
