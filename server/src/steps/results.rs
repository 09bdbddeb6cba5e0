// nfviz/server/src/steps/results.rs

use crate::errors::AppError;
use crate::steps::contexts::{ResultsCtxData, StepEnv};
use nfviz::{Pipeline, StepContext, StepControl, StepRegistry, StepRequest};

pub const STEP_ID: &str = "results";

const LISTED_OBJECTS: usize = 20;
const SHOWN_OBJECTS: usize = 10;

pub fn register_list_results(registry: &StepRegistry, env: &StepEnv) {
  let mut p = Pipeline::<ResultsCtxData, AppError>::new(&[("list_results", false, None), ("show_results", false, None)]);

  p.on_step("list_results", |ctx: StepContext<ResultsCtxData>| async move {
    let env = ctx.read().env.clone();
    let bucket = &env.run.bucket_name;
    let prefix = format!("{}/", env.run.work_prefix);

    ctx.events().info(format!("Listing results in gs://{bucket}..."));
    let objects = env
      .cloud
      .storage
      .list_objects(bucket, &prefix, LISTED_OBJECTS)
      .await?;
    ctx
      .events()
      .info(format!("  Found {} files in {prefix}", objects.len()));
    ctx.write().objects = objects;
    Ok::<_, AppError>(StepControl::Continue)
  });

  p.on_step("show_results", |ctx: StepContext<ResultsCtxData>| async move {
    let (names, total) = {
      let guard = ctx.read();
      let names: Vec<String> = guard.objects.iter().take(SHOWN_OBJECTS).map(|o| o.name.clone()).collect();
      (names, guard.objects.len())
    };
    for name in names {
      ctx.events().info(format!("  • {name}"));
    }
    if total > SHOWN_OBJECTS {
      ctx
        .events()
        .info(format!("  ... and {} more files", total - SHOWN_OBJECTS));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| ResultsCtxData {
    env: env.clone(),
    objects: Vec::new(),
  });
}
