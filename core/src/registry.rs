// nfviz/src/registry.rs

//! Defines `StepRegistry`, a string-keyed registry of steps, and the executor
//! that turns a step request into a well-formed `EventStream`.
//!
//! Every stream produced here ends with exactly one terminal event, whatever
//! happens inside the step: unknown identifiers, handler errors and handler
//! panics all become an error `Log` event followed by a terminal error.

use crate::core::context::{StepContext, StepRequest};
use crate::core::control::StepOutcome;
use crate::core::event::{truncate_diagnostic, Event, EventSink};
use crate::core::stream::EventStream;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{event, info_span, Instrument, Level};

/// Type-erased step runner; hides each step's context and error types.
#[async_trait]
trait AnyStepRunner: Send + Sync {
  /// Runs the step, returning the outcome or a display-ready diagnostic.
  async fn run_erased(&self, request: StepRequest, sink: EventSink) -> Result<StepOutcome, String>;
}

type ContextFactory<TData> = Arc<dyn Fn(&StepRequest) -> TData + Send + Sync>;

/// Wrapper for `Pipeline<TData, Err>` plus the factory that builds a fresh
/// `TData` for every invocation.
struct PipelineWrapper<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: Arc<Pipeline<TData, Err>>,
  make_context: ContextFactory<TData>,
}

#[async_trait]
impl<TData, Err> AnyStepRunner for PipelineWrapper<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  async fn run_erased(&self, request: StepRequest, sink: EventSink) -> Result<StepOutcome, String> {
    let data = (self.make_context)(&request);
    let ctx = StepContext::new(data, sink, request);
    self.pipeline.run(ctx).await.map_err(|e| e.to_string())
  }
}

/// The step registry. Steps are stateless between invocations, so one
/// registry can serve any number of concurrent executions.
pub struct StepRegistry {
  steps: RwLock<HashMap<String, Arc<dyn AnyStepRunner>>>,
}

impl Default for StepRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl StepRegistry {
  pub fn new() -> Self {
    Self {
      steps: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `pipeline` under `step_id`. `make_context` is called once per
  /// execution to build that run's data. Re-registering an id replaces it.
  pub fn register<TData, Err>(
    &self,
    step_id: impl Into<String>,
    pipeline: Pipeline<TData, Err>,
    make_context: impl Fn(&StepRequest) -> TData + Send + Sync + 'static,
  ) where
    TData: 'static + Send + Sync,
    Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  {
    let step_id = step_id.into();
    event!(Level::DEBUG, %step_id, tdata_type = %std::any::type_name::<TData>(), sub_steps = pipeline.len(), "Registering step.");
    let wrapper = PipelineWrapper {
      pipeline: Arc::new(pipeline),
      make_context: Arc::new(make_context),
    };
    self.steps.write().insert(step_id, Arc::new(wrapper));
  }

  /// Makes `alias_id` run the step already registered as `target_id`.
  pub fn alias(&self, alias_id: impl Into<String>, target_id: &str) -> Result<(), FlowError> {
    let mut steps = self.steps.write();
    let runner = steps.get(target_id).cloned().ok_or_else(|| FlowError::StepNotFound {
      step_id: target_id.to_string(),
    })?;
    let alias_id = alias_id.into();
    event!(Level::DEBUG, %alias_id, %target_id, "Registering step alias.");
    steps.insert(alias_id, runner);
    Ok(())
  }

  pub fn contains(&self, step_id: &str) -> bool {
    self.steps.read().contains_key(step_id)
  }

  /// Registered step identifiers, sorted.
  pub fn step_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.steps.read().keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Looks up and executes a step.
  ///
  /// The returned stream is lazy: the step starts when the stream is first
  /// polled. It is single-consumer and cannot be restarted; call `execute`
  /// again for another run.
  pub fn execute(&self, request: StepRequest) -> EventStream {
    let runner = self.steps.read().get(&request.step_id).cloned();
    let (sink, rx) = EventSink::channel();
    let span = info_span!("step", step_id = %request.step_id, phase = %request.phase_or_default());

    let driver = async move {
      let Some(runner) = runner else {
        let err = FlowError::StepNotFound {
          step_id: request.step_id.clone(),
        };
        event!(Level::WARN, "Unknown step requested.");
        sink.error(err.to_string());
        return Event::failed(&err.to_string());
      };

      event!(Level::INFO, "Step started.");
      let run = runner.run_erased(request, sink.clone());
      match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(outcome)) => {
          event!(Level::INFO, ?outcome, "Step finished.");
          Event::complete()
        }
        Ok(Err(diagnostic)) => {
          event!(Level::ERROR, %diagnostic, "Step failed.");
          sink.error(truncate_diagnostic(&diagnostic));
          Event::failed(&diagnostic)
        }
        Err(panic) => {
          let diagnostic = format!("step panicked: {}", panic_message(panic.as_ref()));
          event!(Level::ERROR, %diagnostic, "Step panicked.");
          sink.error(truncate_diagnostic(&diagnostic));
          Event::failed(&diagnostic)
        }
      }
    }
    .instrument(span);

    EventStream::new(Box::pin(driver), rx)
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.as_str()
  } else {
    "unknown panic"
  }
}
