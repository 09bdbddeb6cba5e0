// nfviz/examples/step_registry.rs

use futures_util::StreamExt;
use nfviz::{sse, ExternalError, FlowError, Pipeline, StepContext, StepControl, StepRegistry, StepRequest};
use std::collections::HashSet;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::info;

/// Stand-in for an external system holding named resources.
#[derive(Default)]
struct FakeCloud {
  buckets: Mutex<HashSet<String>>,
}

impl FakeCloud {
  fn get(&self, name: &str) -> Result<(), ExternalError> {
    if self.buckets.lock().contains(name) {
      Ok(())
    } else {
      Err(ExternalError::not_found(format!("bucket {name}")))
    }
  }

  fn create(&self, name: &str) -> Result<(), ExternalError> {
    if self.buckets.lock().insert(name.to_string()) {
      Ok(())
    } else {
      Err(ExternalError::already_exists(format!("bucket {name}")))
    }
  }
}

struct BucketStep {
  cloud: Arc<FakeCloud>,
  bucket: String,
  exists: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- nfviz Step Registry Example ---");

  let cloud = Arc::new(FakeCloud::default());

  // 1. A step is a pipeline of sub-steps: check first, create only if missing.
  let mut pipeline = Pipeline::<BucketStep, FlowError>::new(&[
    ("check", false, None),
    (
      "create",
      false,
      Some(Arc::new(|ctx: &StepContext<BucketStep>| ctx.read().exists) as nfviz::SkipCondition<BucketStep>),
    ),
  ]);

  pipeline.on_step("check", |ctx: StepContext<BucketStep>| async move {
    let (cloud, bucket) = {
      let data = ctx.read();
      (data.cloud.clone(), data.bucket.clone())
    };
    match cloud.get(&bucket) {
      Ok(()) => {
        ctx.events().info(format!("Bucket {bucket} already exists"));
        ctx.write().exists = true;
      }
      Err(e) if e.is_not_found() => ctx.events().info(format!("Creating bucket {bucket}...")),
      Err(e) => return Err(e),
    }
    Ok(StepControl::Continue)
  });

  pipeline.on_step("create", |ctx: StepContext<BucketStep>| async move {
    let (cloud, bucket) = {
      let data = ctx.read();
      (data.cloud.clone(), data.bucket.clone())
    };
    match cloud.create(&bucket) {
      Ok(()) => ctx.events().success(format!("Bucket {bucket} created")),
      Err(e) if e.is_already_exists() => ctx.events().info(format!("Bucket {bucket} already exists")),
      Err(e) => return Err(e),
    }
    Ok(StepControl::Continue)
  });

  // 2. Register it with a factory building fresh per-run data.
  let registry = StepRegistry::new();
  let factory_cloud = cloud.clone();
  registry.register("create-bucket", pipeline, move |_req: &StepRequest| BucketStep {
    cloud: factory_cloud.clone(),
    bucket: "demo-bucket".to_string(),
    exists: false,
  });

  // 3. Run it twice; the second run finds the bucket and still succeeds.
  for run in 1..=2 {
    info!(run, "Executing create-bucket");
    let mut frames = sse::frames(registry.execute(StepRequest::new("create-bucket")));
    while let Some(frame) = frames.next().await {
      print!("{frame}");
    }
  }

  // 4. Unknown steps still produce a well-formed stream.
  let mut frames = sse::frames(registry.execute(StepRequest::new("no-such-step")));
  while let Some(frame) = frames.next().await {
    print!("{frame}");
  }

  Ok(())
}
