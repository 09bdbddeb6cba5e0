// nfviz/server/src/steps/jobs.rs

use crate::errors::AppError;
use crate::steps::common::short;
use crate::steps::contexts::{JobsCtxData, StepEnv};
use nfviz::{JobReconciler, Pipeline, SkipCondition, StepContext, StepControl, StepRegistry, StepRequest, TaskStatus};
use std::sync::Arc;
use tracing::{event, Level};

pub const STEP_ID: &str = "check-jobs";
/// Per-task step ids of the pipeline phase; each one shows the same job listing.
pub const TASK_ALIASES: [&str; 3] = ["fastqc", "quant", "multiqc"];

const SHOWN_JOBS: usize = 5;

pub fn register_check_jobs(registry: &StepRegistry, env: &StepEnv) {
  let no_jobs: SkipCondition<JobsCtxData> = Arc::new(|ctx: &StepContext<JobsCtxData>| ctx.read().jobs.is_empty());

  let mut p = Pipeline::<JobsCtxData, AppError>::new(&[
    ("list_jobs", false, None),
    ("show_jobs", false, None),
    ("reconcile_tasks", true, Some(no_jobs)),
  ]);

  p.on_step("list_jobs", |ctx: StepContext<JobsCtxData>| async move {
    let env = ctx.read().env.clone();
    ctx.events().info("Checking Google Batch jobs...");
    match env.cloud.jobs.list_jobs(&env.run.batch_parent()).await {
      Ok(mut jobs) => {
        // Newest first; the provider promises no order.
        jobs.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        ctx.write().jobs = jobs;
        Ok(StepControl::Continue)
      }
      // A job listing is informational here; not reaching it is not a failure.
      Err(e) => {
        event!(Level::WARN, error = %e, "Could not list batch jobs.");
        ctx
          .events()
          .info(format!("  Could not list jobs: {}", short(&e.to_string(), 100)));
        Ok::<_, AppError>(StepControl::Stop)
      }
    }
  });

  p.on_step("show_jobs", |ctx: StepContext<JobsCtxData>| async move {
    let shown: Vec<(String, String)> = {
      let guard = ctx.read();
      ctx.events().info(format!("  Found {} jobs", guard.jobs.len()));
      guard
        .jobs
        .iter()
        .take(SHOWN_JOBS)
        .map(|job| (job.short_name().to_string(), job.state.clone()))
        .collect()
    };
    for (name, state) in shown {
      if state == "SUCCEEDED" {
        ctx.events().success(format!("  • {name}: {state}"));
      } else {
        ctx.events().info(format!("  • {name}: {state}"));
      }
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("reconcile_tasks", |ctx: StepContext<JobsCtxData>| async move {
    let (env, jobs) = {
      let guard = ctx.read();
      (guard.env.clone(), guard.jobs.clone())
    };
    let reconciler = JobReconciler::new(env.run.clone(), env.cloud.jobs.clone(), env.cloud.storage.clone());
    let report = reconciler.reconcile(&jobs).await;
    for (task, status) in report.tasks.iter().filter(|(_, s)| *s != TaskStatus::Pending) {
      ctx
        .events()
        .task_update(task, status, format!("{task} {status} (batch jobs)"));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| JobsCtxData {
    env: env.clone(),
    jobs: Vec::new(),
  });
}
