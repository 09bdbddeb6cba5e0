// nfviz/server/src/steps/service_account.rs

use crate::errors::AppError;
use crate::steps::contexts::{ServiceAccountCtxData, StepEnv};
use nfviz::{Pipeline, SkipCondition, StepContext, StepControl, StepRegistry, StepRequest};
use std::sync::Arc;
use tracing::{event, Level};

pub const STEP_ID: &str = "create-sa";
const DISPLAY_NAME: &str = "Nextflow Pipeline Service Account";

pub fn register_create_service_account(registry: &StepRegistry, env: &StepEnv) {
  let already_exists: SkipCondition<ServiceAccountCtxData> =
    Arc::new(|ctx: &StepContext<ServiceAccountCtxData>| ctx.read().exists);

  let mut p = Pipeline::<ServiceAccountCtxData, AppError>::new(&[
    ("check_service_account", false, None),
    ("create_service_account", false, Some(already_exists)),
  ]);

  p.on_step("check_service_account", |ctx: StepContext<ServiceAccountCtxData>| async move {
    let (iam, project, email, name) = {
      let guard = ctx.read();
      (
        guard.env.cloud.iam.clone(),
        guard.env.run.project_id.clone(),
        guard.email.clone(),
        guard.env.run.service_account_name.clone(),
      )
    };

    ctx.events().info(format!("Creating service account: {name}..."));
    match iam.get_service_account(&project, &email).await {
      Ok(_) => {
        ctx.events().info(format!("  Service account already exists: {email}"));
        ctx.write().exists = true;
      }
      Err(e) if e.is_not_found() => {
        event!(Level::DEBUG, %email, "Service account not found; will create it.");
      }
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("create_service_account", |ctx: StepContext<ServiceAccountCtxData>| async move {
    let (iam, project, email, account_id) = {
      let guard = ctx.read();
      (
        guard.env.cloud.iam.clone(),
        guard.env.run.project_id.clone(),
        guard.email.clone(),
        guard.env.run.service_account_name.clone(),
      )
    };

    match iam.create_service_account(&project, &account_id, DISPLAY_NAME).await {
      Ok(account) => ctx.events().success(format!("  Created: {}", account.email)),
      Err(e) if e.is_already_exists() => ctx.events().info(format!("  Service account already exists: {email}")),
      Err(e) => return Err(AppError::from(e)),
    }
    ctx.write().exists = true;
    Ok(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| ServiceAccountCtxData {
    email: env.run.service_account_email(),
    env: env.clone(),
    exists: false,
  });
}
