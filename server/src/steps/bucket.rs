// nfviz/server/src/steps/bucket.rs

use crate::errors::AppError;
use crate::steps::contexts::{BucketCtxData, StepEnv};
use nfviz::{Pipeline, SkipCondition, StepContext, StepControl, StepRegistry, StepRequest};
use std::sync::Arc;
use tracing::{event, Level};

pub const STEP_ID: &str = "create-bucket";

pub fn register_create_bucket(registry: &StepRegistry, env: &StepEnv) {
  let bucket_known: SkipCondition<BucketCtxData> = Arc::new(|ctx: &StepContext<BucketCtxData>| ctx.read().bucket.is_some());

  let mut p = Pipeline::<BucketCtxData, AppError>::new(&[
    ("check_bucket", false, None),
    ("create_bucket", false, Some(bucket_known)),
    ("report_location", false, None),
  ]);

  p.on_step("check_bucket", |ctx: StepContext<BucketCtxData>| async move {
    let (storage, bucket) = {
      let guard = ctx.read();
      (guard.env.cloud.storage.clone(), guard.env.run.bucket_name.clone())
    };

    ctx.events().info(format!("Creating GCS bucket: gs://{bucket}..."));
    match storage.get_bucket(&bucket).await {
      Ok(info) => {
        ctx.events().info(format!("  Bucket already exists: gs://{bucket}"));
        ctx.write().bucket = Some(info);
      }
      Err(e) if e.is_not_found() => event!(Level::DEBUG, %bucket, "Bucket not found; will create it."),
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("create_bucket", |ctx: StepContext<BucketCtxData>| async move {
    let (storage, bucket, region) = {
      let guard = ctx.read();
      (
        guard.env.cloud.storage.clone(),
        guard.env.run.bucket_name.clone(),
        guard.env.run.region.clone(),
      )
    };

    match storage.create_bucket(&bucket, &region).await {
      Ok(info) => {
        ctx
          .events()
          .success(format!("  Created bucket: gs://{bucket} in {region}"));
        ctx.write().bucket = Some(info);
      }
      // Bucket names are global; a 409 here may also mean another project owns it.
      Err(e) if e.is_already_exists() => ctx.events().info(format!("  Bucket already exists: gs://{bucket}")),
      Err(e) => return Err(AppError::from(e)),
    }
    Ok(StepControl::Continue)
  });

  p.on_step("report_location", |ctx: StepContext<BucketCtxData>| async move {
    let location = ctx.read().bucket.as_ref().map(|b| b.location.clone());
    if let Some(location) = location {
      ctx.events().info(format!("  Location: {location}"));
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  let env = env.clone();
  registry.register(STEP_ID, p, move |_req: &StepRequest| BucketCtxData {
    env: env.clone(),
    bucket: None,
  });
}
