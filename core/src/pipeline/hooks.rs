// nfviz/src/pipeline/hooks.rs

//! Handler registration for sub-steps.

use crate::core::context::{Handler, StepContext};
use crate::core::control::StepControl;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use std::future::Future;
use tracing::{event, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Registers a handler for a sub-step. Several handlers on one sub-step run
  /// in registration order.
  ///
  /// `handler_fn` may return any error convertible into the pipeline's `Err`,
  /// so plain `async fn`s returning `Result<StepControl, ExternalError>` or
  /// `anyhow::Result<StepControl>` can be registered directly when `Err`
  /// implements the matching `From`.
  pub fn on_step<F, UserProvidedErr>(
    &mut self,
    sub_step: &str,
    handler_fn: impl Fn(StepContext<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<StepControl, UserProvidedErr>> + Send + 'static,
    UserProvidedErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_sub_step_exists(sub_step);
    let final_handler: Handler<TData, Err> = Box::new(move |ctx| {
      let user_fut = handler_fn(ctx);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self
      .handlers
      .entry(sub_step.to_string())
      .or_default()
      .push(final_handler);
    event!(Level::TRACE, %sub_step, "Handler registered.");
  }
}
