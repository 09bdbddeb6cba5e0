// nfviz/server/src/steps/contexts.rs

//! Per-run data structs of every step. A factory builds a fresh value for
//! each execution; handlers receive it wrapped in `nfviz::StepContext`.

use crate::config::{AppConfig, StepSettings};
use nfviz::external::{BucketInfo, ExternalJob, IamPolicy, NotebookInstance, ObjectInfo, Operation};
use nfviz::{Collaborators, PollBudget, RunConfig, StatusMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What every step needs: the run identity, the step knobs and the cloud.
#[derive(Clone)]
pub struct StepEnv {
  pub run: Arc<RunConfig>,
  pub settings: Arc<StepSettings>,
  pub cloud: Collaborators,
}

impl StepEnv {
  pub fn new(config: &AppConfig, cloud: Collaborators) -> Self {
    Self {
      run: Arc::new(config.run.clone()),
      settings: Arc::new(config.steps.clone()),
      cloud,
    }
  }

  pub fn poll_budget(&self, max_wait: Duration) -> PollBudget {
    PollBudget::new(self.settings.operation_poll_interval, max_wait)
  }
}

// --- Setup phase ---

pub struct ApisCtxData {
  pub env: StepEnv,
  pub enabled: usize,
}

pub struct ServiceAccountCtxData {
  pub env: StepEnv,
  pub email: String,
  pub exists: bool,
}

pub struct IamRolesCtxData {
  pub env: StepEnv,
  /// `serviceAccount:<email>`
  pub member: String,
  pub policy: Option<IamPolicy>,
  pub added_roles: Vec<&'static str>,
}

pub struct NetworkCtxData {
  pub env: StepEnv,
  /// Resources that were still being created when their wait ran out.
  pub still_pending: Vec<&'static str>,
}

pub struct BucketCtxData {
  pub env: StepEnv,
  pub bucket: Option<BucketInfo>,
}

pub struct NextflowConfigCtxData {
  pub env: StepEnv,
  pub rendered: Option<String>,
  pub written_to: Option<PathBuf>,
}

pub struct NotebookCtxData {
  pub env: StepEnv,
  pub instance: Option<NotebookInstance>,
  /// Creation operation to wait on, either issued by this run or found in flight.
  pub operation: Option<Operation>,
}

// --- Pipeline phase ---

pub struct LaunchCtxData {
  pub env: StepEnv,
  pub tasks: StatusMap,
  pub lines_seen: usize,
  pub exit_code: Option<i32>,
}

pub struct JobsCtxData {
  pub env: StepEnv,
  pub jobs: Vec<ExternalJob>,
}

pub struct ResultsCtxData {
  pub env: StepEnv,
  pub objects: Vec<ObjectInfo>,
}
