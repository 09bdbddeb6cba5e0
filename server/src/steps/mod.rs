// nfviz/server/src/steps/mod.rs

//! Defines and registers every provisioning and inspection step.

use crate::steps::contexts::StepEnv;
use nfviz::{FlowError, StepRegistry};

pub mod common;
pub mod contexts;

// Setup phase
pub mod apis;
pub mod bucket;
pub mod iam_roles;
pub mod network;
pub mod nextflow_config;
pub mod notebook;
pub mod service_account;

// Pipeline phase
pub mod jobs;
pub mod launch;
pub mod results;

/// Registers all steps with the provided registry.
///
/// Called once at startup; steps keep no state between runs, so the registry
/// is shared by every request afterwards.
pub fn register_all_steps(registry: &StepRegistry, env: &StepEnv) -> Result<(), FlowError> {
  tracing::info!("Registering steps...");

  apis::register_enable_apis(registry, env);
  service_account::register_create_service_account(registry, env);
  iam_roles::register_iam_roles(registry, env);
  network::register_create_network(registry, env);
  bucket::register_create_bucket(registry, env);
  nextflow_config::register_write_config(registry, env);
  notebook::register_create_notebook(registry, env);

  launch::register_launch_pipeline(registry, env);
  jobs::register_check_jobs(registry, env);
  for alias in jobs::TASK_ALIASES {
    registry.alias(alias, jobs::STEP_ID)?;
  }
  results::register_list_results(registry, env);

  tracing::info!(steps = ?registry.step_ids(), "All steps registered.");
  Ok(())
}
