// nfviz/server/src/steps/apis.rs

use crate::errors::AppError;
use crate::steps::contexts::{ApisCtxData, StepEnv};
use nfviz::{Pipeline, SkipCondition, StepContext, StepControl, StepRegistry, StepRequest};
use tracing::{event, Level};

pub const STEP_ID: &str = "enable-apis";

/// Each API is its own optional sub-step, so one refusal does not stop the rest.
pub const REQUIRED_APIS: [&str; 6] = [
  "batch.googleapis.com",
  "compute.googleapis.com",
  "logging.googleapis.com",
  "iam.googleapis.com",
  "cloudresourcemanager.googleapis.com",
  "notebooks.googleapis.com",
];

pub fn register_enable_apis(registry: &StepRegistry, env: &StepEnv) {
  let mut sub_steps: Vec<(&str, bool, Option<SkipCondition<ApisCtxData>>)> = vec![("announce_apis", false, None)];
  sub_steps.extend(REQUIRED_APIS.iter().map(|api| (*api, true, None)));
  sub_steps.push(("summarize_apis", false, None));
  let mut p = Pipeline::<ApisCtxData, AppError>::new(&sub_steps);

  p.on_step("announce_apis", |ctx: StepContext<ApisCtxData>| async move {
    ctx
      .events()
      .info("Enabling Batch, Compute, Logging, IAM, Resource Manager and Notebooks APIs...");
    Ok::<_, AppError>(StepControl::Continue)
  });

  for api in REQUIRED_APIS {
    p.on_step(api, move |ctx: StepContext<ApisCtxData>| enable_api(ctx, api));
  }

  p.on_step("summarize_apis", |ctx: StepContext<ApisCtxData>| async move {
    let enabled = ctx.read().enabled;
    event!(Level::INFO, enabled, required = REQUIRED_APIS.len(), "API enablement finished.");
    ctx
      .events()
      .info(format!("  {enabled}/{} APIs enabled", REQUIRED_APIS.len()));
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| ApisCtxData {
    env: env.clone(),
    enabled: 0,
  });
}

async fn enable_api(ctx: StepContext<ApisCtxData>, api: &'static str) -> Result<StepControl, AppError> {
  let (services, project) = {
    let guard = ctx.read();
    (guard.env.cloud.services.clone(), guard.env.run.project_id.clone())
  };

  ctx.events().info(format!("  Enabling {api}..."));
  match services.enable_service(&project, api).await {
    Ok(()) => ctx.events().success(format!("  ✓ {api} enabled")),
    Err(e) if e.is_already_exists() || e.to_string().to_ascii_lowercase().contains("already enabled") => {
      ctx.events().info(format!("  ✓ {api} already enabled"))
    }
    Err(e) => {
      event!(Level::WARN, %api, error = %e, "Could not enable API.");
      return Err(e.into());
    }
  }
  ctx.write().enabled += 1;
  Ok(StepControl::Continue)
}
