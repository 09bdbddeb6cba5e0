// nfviz/server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use nfviz::RunConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

/// Knobs of the concrete steps that are not part of the run identity.
#[derive(Debug, Clone)]
pub struct StepSettings {
  pub notebook_machine_type: String,
  /// Program and arguments of the pipeline launch.
  pub pipeline_command: Vec<String>,
  /// Working directory of the launch; `nextflow.config` is written here.
  pub pipeline_workdir: PathBuf,
  /// On a zero exit status, mark every task not yet terminal as complete.
  pub force_complete_on_success: bool,
  pub operation_poll_interval: Duration,
  pub network_wait: Duration,
  pub notebook_wait: Duration,
}

impl Default for StepSettings {
  fn default() -> Self {
    Self {
      notebook_machine_type: "e2-standard-4".to_string(),
      pipeline_command: default_pipeline_command(),
      pipeline_workdir: PathBuf::from("."),
      force_complete_on_success: true,
      operation_poll_interval: Duration::from_secs(2),
      network_wait: Duration::from_secs(300),
      notebook_wait: Duration::from_secs(600),
    }
  }
}

fn default_pipeline_command() -> Vec<String> {
  ["nextflow", "run", "nextflow-io/rnaseq-nf", "-c", "nextflow.config"]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub log_format: LogFormat,
  pub run: RunConfig,
  pub steps: StepSettings,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    Self::from_vars(|name| env::var(name).ok())
  }

  /// Builds the config from any variable lookup; `from_env` passes the process
  /// environment.
  pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_or = |name: &str, default: &str| get(name).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string());

    let server_host = get_or("SERVER_HOST", "0.0.0.0");
    let server_port = parse_var::<u16>(&get, "SERVER_PORT", 5000)?;
    let log_format = match get_or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
      "json" => LogFormat::Json,
      "pretty" | "text" => LogFormat::Pretty,
      other => return Err(AppError::Config(format!("Invalid LOG_FORMAT: {other}"))),
    };

    let project_id = get_or("GCP_PROJECT_ID", "wz-workload-viz");
    let region = get_or("GCP_REGION", "us-central1");
    let mut run = RunConfig::new(project_id, region);
    if let Some(zone) = get("GCP_ZONE").filter(|v| !v.is_empty()) {
      run = run.with_zone(zone);
    }
    if let Some(bucket) = get("BUCKET_NAME").filter(|v| !v.is_empty()) {
      run = run.with_bucket(bucket);
    }
    if let Some(sa) = get("SERVICE_ACCOUNT_NAME").filter(|v| !v.is_empty()) {
      run = run.with_service_account(sa);
    }
    if let Some(notebook) = get("NOTEBOOK_NAME").filter(|v| !v.is_empty()) {
      run = run.with_notebook(notebook);
    }

    let defaults = StepSettings::default();
    let pipeline_command = match get("PIPELINE_COMMAND") {
      Some(cmd) if !cmd.trim().is_empty() => cmd.split_whitespace().map(String::from).collect(),
      _ => defaults.pipeline_command,
    };
    let steps = StepSettings {
      notebook_machine_type: get_or("NOTEBOOK_MACHINE_TYPE", &defaults.notebook_machine_type),
      pipeline_command,
      pipeline_workdir: get("PIPELINE_WORKDIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or(defaults.pipeline_workdir),
      force_complete_on_success: parse_var(&get, "FORCE_COMPLETE_ON_SUCCESS", defaults.force_complete_on_success)?,
      operation_poll_interval: Duration::from_secs(parse_var(&get, "OPERATION_POLL_INTERVAL_SECS", 2u64)?),
      network_wait: Duration::from_secs(parse_var(&get, "NETWORK_WAIT_SECS", 300u64)?),
      notebook_wait: Duration::from_secs(parse_var(&get, "NOTEBOOK_WAIT_SECS", 600u64)?),
    };
    if steps.operation_poll_interval.is_zero() {
      return Err(AppError::Config("OPERATION_POLL_INTERVAL_SECS must be greater than zero".to_string()));
    }

    tracing::info!(project = %run.project_id, region = %run.region, "Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      log_format,
      run,
      steps,
    })
  }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match get(name).filter(|v| !v.trim().is_empty()) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {name}: {e}"))),
    None => Ok(default),
  }
}
