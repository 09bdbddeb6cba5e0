// nfviz/server/src/steps/iam_roles.rs

use crate::errors::AppError;
use crate::steps::contexts::{IamRolesCtxData, StepEnv};
use nfviz::{Pipeline, SkipCondition, StepContext, StepControl, StepRegistry, StepRequest};
use std::sync::Arc;
use tracing::{event, Level};

pub const STEP_ID: &str = "iam-roles";

/// Project roles the pipeline service account needs.
pub const REQUIRED_ROLES: [&str; 5] = [
  "roles/iam.serviceAccountUser",
  "roles/batch.jobsEditor",
  "roles/batch.agentReporter",
  "roles/logging.viewer",
  "roles/storage.admin",
];

pub fn register_iam_roles(registry: &StepRegistry, env: &StepEnv) {
  let nothing_added: SkipCondition<IamRolesCtxData> =
    Arc::new(|ctx: &StepContext<IamRolesCtxData>| ctx.read().added_roles.is_empty());

  let mut p = Pipeline::<IamRolesCtxData, AppError>::new(&[
    ("read_policy", false, None),
    ("grant_missing_roles", false, None),
    ("write_policy", false, Some(nothing_added)),
  ]);

  p.on_step("read_policy", |ctx: StepContext<IamRolesCtxData>| async move {
    let (iam, project) = {
      let guard = ctx.read();
      (guard.env.cloud.iam.clone(), guard.env.run.project_id.clone())
    };
    ctx.events().info("Adding IAM roles to service account...");
    let policy = iam.get_policy(&project).await?;
    event!(Level::DEBUG, bindings = policy.bindings.len(), "Read project IAM policy.");
    ctx.write().policy = Some(policy);
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("grant_missing_roles", |ctx: StepContext<IamRolesCtxData>| async move {
    let added = {
      let mut guard = ctx.write();
      let member = guard.member.clone();
      let Some(policy) = guard.policy.as_mut() else {
        return Err(AppError::Internal("IAM policy was not loaded".to_string()));
      };
      let added: Vec<&'static str> = REQUIRED_ROLES
        .into_iter()
        .filter(|role| policy.grant(role, &member))
        .collect();
      guard.added_roles = added.clone();
      added
    };

    for role in REQUIRED_ROLES {
      if added.contains(&role) {
        ctx.events().info(format!("  Adding {role}..."));
      } else {
        ctx.events().info(format!("  ✓ {role} already granted"));
      }
    }
    if added.is_empty() {
      ctx.events().info("  Policy unchanged");
    }
    Ok(StepControl::Continue)
  });

  p.on_step("write_policy", |ctx: StepContext<IamRolesCtxData>| async move {
    let (iam, project, policy, added) = {
      let guard = ctx.read();
      (
        guard.env.cloud.iam.clone(),
        guard.env.run.project_id.clone(),
        guard.policy.clone().unwrap_or_default(),
        guard.added_roles.clone(),
      )
    };
    iam.set_policy(&project, &policy).await?;
    event!(Level::INFO, roles = ?added, "Project IAM policy updated.");
    for role in added {
      ctx.events().success(format!("  ✓ {role} granted"));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| IamRolesCtxData {
    member: format!("serviceAccount:{}", env.run.service_account_email()),
    env: env.clone(),
    policy: None,
    added_roles: Vec::new(),
  });
}
