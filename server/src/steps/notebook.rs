// nfviz/server/src/steps/notebook.rs

//! `create-notebook`: a Vertex AI Workbench instance on the private network,
//! running as the pipeline service account.

use crate::errors::AppError;
use crate::steps::common::report_still_running;
use crate::steps::contexts::{NotebookCtxData, StepEnv};
use crate::steps::network::{NETWORK_NAME, SUBNETWORK_NAME};
use nfviz::external::NotebookSpec;
use nfviz::{poll_until_done, ExternalError, Pipeline, PollOutcome, SkipCondition, StepContext, StepControl, StepRegistry, StepRequest};
use std::sync::Arc;
use tracing::{event, Level};

pub const STEP_ID: &str = "create-notebook";

pub fn register_create_notebook(registry: &StepRegistry, env: &StepEnv) {
  let instance_known: SkipCondition<NotebookCtxData> =
    Arc::new(|ctx: &StepContext<NotebookCtxData>| ctx.read().instance.is_some());
  let creation_known: SkipCondition<NotebookCtxData> = Arc::new(|ctx: &StepContext<NotebookCtxData>| {
    let guard = ctx.read();
    guard.instance.is_some() || guard.operation.is_some()
  });
  let nothing_to_wait_for: SkipCondition<NotebookCtxData> = Arc::new(|ctx: &StepContext<NotebookCtxData>| {
    let guard = ctx.read();
    guard.operation.is_none() && !guard.instance.as_ref().is_some_and(|i| i.is_provisioning())
  });

  let mut p = Pipeline::<NotebookCtxData, AppError>::new(&[
    ("check_notebook", false, None),
    ("find_pending_creation", false, Some(instance_known)),
    ("create_notebook", false, Some(creation_known)),
    ("await_notebook", false, Some(nothing_to_wait_for)),
    ("report_notebook", false, None),
  ]);

  p.on_step("check_notebook", |ctx: StepContext<NotebookCtxData>| async move {
    let env = ctx.read().env.clone();
    let name = &env.run.notebook_name;

    ctx
      .events()
      .info(format!("Creating Vertex AI Workbench instance: {name}..."));
    match env.cloud.notebooks.get_instance(&env.run.notebook_instance_path()).await {
      Ok(instance) => {
        ctx
          .events()
          .info(format!("  Instance already exists: {name} ({})", instance.state));
        ctx.write().instance = Some(instance);
      }
      Err(e) if e.is_not_found() => event!(Level::DEBUG, %name, "Workbench instance not found."),
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  // An instance that is still being created is not visible yet; its operation is.
  p.on_step("find_pending_creation", |ctx: StepContext<NotebookCtxData>| async move {
    let env = ctx.read().env.clone();
    let suffix = format!("/instances/{}", env.run.notebook_name);
    match env.cloud.notebooks.list_operations(&env.run.notebook_parent()).await {
      Ok(operations) => {
        let pending = operations
          .into_iter()
          .find(|op| !op.done && op.target.as_deref().is_some_and(|t| t.ends_with(&suffix)));
        if let Some(op) = pending {
          ctx
            .events()
            .info(format!("  Creation already in progress ({})", op.name));
          ctx.write().operation = Some(op);
        }
      }
      Err(e) => event!(Level::DEBUG, error = %e, "Could not list notebook operations; assuming none in flight."),
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("create_notebook", |ctx: StepContext<NotebookCtxData>| async move {
    let env = ctx.read().env.clone();
    let spec = NotebookSpec {
      machine_type: env.settings.notebook_machine_type.clone(),
      service_account_email: env.run.service_account_email(),
      network: env.run.network_path(NETWORK_NAME),
      subnetwork: env.run.subnetwork_path(SUBNETWORK_NAME),
      disable_public_ip: true,
    };

    ctx
      .events()
      .info(format!("  Machine type: {} (no public IP)", spec.machine_type));
    match env
      .cloud
      .notebooks
      .create_instance(&env.run.notebook_parent(), &env.run.notebook_name, &spec)
      .await
    {
      Ok(op) => {
        ctx.events().info("  Creation requested");
        ctx.write().operation = Some(op);
      }
      Err(e) if e.is_already_exists() => {
        ctx
          .events()
          .info(format!("  Instance already exists: {}", env.run.notebook_name))
      }
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("await_notebook", |ctx: StepContext<NotebookCtxData>| async move {
    let (env, operation) = {
      let guard = ctx.read();
      (guard.env.clone(), guard.operation.clone())
    };
    ctx.events().info("  Waiting for the instance to become ready...");

    let notebooks = &*env.cloud.notebooks;
    let instance_path = env.run.notebook_instance_path();
    let instance_path = instance_path.as_str();
    let operation_name = operation.as_ref().map(|op| op.name.as_str());
    let budget = env.poll_budget(env.settings.notebook_wait);

    let outcome = poll_until_done(budget, move || async move {
      if let Some(operation_name) = operation_name {
        let op = notebooks.get_operation(operation_name).await?;
        if !op.done {
          return Ok(None);
        }
        if let Some(message) = op.error {
          return Err(ExternalError::failed(format!("Workbench creation failed: {message}")));
        }
      }
      match notebooks.get_instance(instance_path).await {
        Ok(instance) if instance.is_provisioning() => Ok(None),
        Ok(instance) => Ok(Some(instance)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
      }
    })
    .await?;

    match outcome {
      PollOutcome::Done(instance) => {
        ctx
          .events()
          .success(format!("  ✓ Instance {} is {}", env.run.notebook_name, instance.state));
        ctx.write().instance = Some(instance);
      }
      PollOutcome::TimedOut { waited } => report_still_running(ctx.events(), "Workbench instance provisioning", waited),
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("report_notebook", |ctx: StepContext<NotebookCtxData>| async move {
    let instance = ctx.read().instance.clone();
    match instance {
      Some(instance) if instance.is_active() => {
        if let Some(uri) = instance.proxy_uri {
          ctx.events().info(format!("  JupyterLab: https://{uri}"));
        }
      }
      Some(instance) => ctx.events().info(format!("  State: {}", instance.state)),
      None => ctx.events().info("  State: PROVISIONING"),
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| NotebookCtxData {
    env: env.clone(),
    instance: None,
    operation: None,
  });
}
