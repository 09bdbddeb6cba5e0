// nfviz/server/src/steps/nextflow_config.rs

//! `write-config`: renders `nextflow.config` for the Google Batch executor
//! and writes it next to where the pipeline is launched.

use crate::errors::AppError;
use crate::steps::contexts::{NextflowConfigCtxData, StepEnv};
use crate::steps::network::{NETWORK_NAME, SUBNETWORK_NAME};
use nfviz::{Pipeline, RunConfig, StepContext, StepControl, StepRegistry, StepRequest};
use tracing::{event, Level};

pub const STEP_ID: &str = "write-config";
pub const CONFIG_FILE_NAME: &str = "nextflow.config";

const MAX_RETRIES: u32 = 5;

pub fn render(run: &RunConfig) -> String {
  let work_dir = run.work_dir_url();
  let project = &run.project_id;
  let region = &run.region;
  let sa_email = run.service_account_email();
  let network = run.network_path(NETWORK_NAME);
  let subnetwork = run.subnetwork_path(SUBNETWORK_NAME);
  format!(
    r#"// Nextflow configuration for Google Cloud Batch
workDir = '{work_dir}'

process {{
  executor = 'google-batch'
  container = 'nextflow/rnaseq-nf'
  // Spot preemptions and transient failures are retried
  errorStrategy = 'retry'
  maxRetries = {MAX_RETRIES}
}}

google {{
  project = '{project}'
  location = '{region}'
  batch {{
    spot = true
    serviceAccountEmail = '{sa_email}'
    // Internal IPs only; egress goes through Cloud NAT
    usePrivateAddress = true
    network = '{network}'
    subnetwork = '{subnetwork}'
  }}
}}

timeline {{
  enabled = true
  file = 'timeline.html'
  overwrite = true
}}

report {{
  enabled = true
  file = 'report.html'
  overwrite = true
}}
"#
  )
}

pub fn register_write_config(registry: &StepRegistry, env: &StepEnv) {
  let mut p = Pipeline::<NextflowConfigCtxData, AppError>::new(&[
    ("render_config", false, None),
    ("write_config_file", false, None),
    ("summarize_config", false, None),
  ]);

  p.on_step("render_config", |ctx: StepContext<NextflowConfigCtxData>| async move {
    ctx.events().info(format!("Writing {CONFIG_FILE_NAME}..."));
    let run = ctx.read().env.run.clone();
    ctx.write().rendered = Some(render(&run));
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("write_config_file", |ctx: StepContext<NextflowConfigCtxData>| async move {
    let (content, dir) = {
      let guard = ctx.read();
      (guard.rendered.clone(), guard.env.settings.pipeline_workdir.clone())
    };
    let content = content.ok_or_else(|| AppError::Internal("configuration was not rendered".to_string()))?;

    let path = dir.join(CONFIG_FILE_NAME);
    tokio::fs::write(&path, content.as_bytes()).await?;
    event!(Level::INFO, path = %path.display(), bytes = content.len(), "Wrote Nextflow configuration.");
    ctx.events().success(format!("  Written to: {}", path.display()));
    ctx.write().written_to = Some(path);
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("summarize_config", |ctx: StepContext<NextflowConfigCtxData>| async move {
    let run = ctx.read().env.run.clone();
    let events = ctx.events();
    events.info(format!("  workDir: {}", run.work_dir_url()));
    events.info("  executor: google-batch");
    events.info(format!("  region: {}", run.region));
    events.info("  usePrivateAddress: true (internal IPs only)");
    events.info(format!("  errorStrategy: retry (max {MAX_RETRIES} attempts)"));
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| NextflowConfigCtxData {
    env: env.clone(),
    rendered: None,
    written_to: None,
  });
}
