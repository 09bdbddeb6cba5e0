// nfviz/src/pipeline/execution.rs

//! Contains the `Pipeline::run()` method, which drives a step's sub-steps in order.

use crate::core::context::StepContext;
use crate::core::control::{StepControl, StepOutcome};
use crate::core::event::truncate_diagnostic;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every sub-step against `ctx`.
  ///
  /// - a sub-step whose `skip_if` holds is skipped;
  /// - a non-optional sub-step without handlers fails with
  ///   `FlowError::HandlerMissing`, converted into `Err`;
  /// - a failing optional sub-step is reported on the event stream as a
  ///   warning and the run continues with the next sub-step;
  /// - `StepControl::Stop` ends the run with `StepOutcome::Stopped`.
  #[instrument(
        name = "Pipeline::run",
        skip_all,
        fields(
            step_id = %ctx.request().step_id,
            phase = %ctx.request().phase_or_default(),
            num_sub_steps = self.sub_steps.len(),
        ),
        err(Display)
    )]
  pub async fn run(&self, ctx: StepContext<TData>) -> Result<StepOutcome, Err> {
    event!(Level::DEBUG, "Step execution starting.");

    for (sub_step_idx, sub_step) in self.sub_steps.iter().enumerate() {
      let name = sub_step.name.as_str();
      let sub_step_span = span!(
        Level::INFO,
        "sub_step_execution",
        sub_step = name,
        sub_step_index = sub_step_idx,
        optional = sub_step.optional
      );

      if let Some(skip_cond_fn) = &sub_step.skip_if {
        if skip_cond_fn(&ctx) {
          event!(parent: &sub_step_span, Level::DEBUG, "Sub-step skipped due to 'skip_if' condition.");
          continue;
        }
      }

      let handlers = match self.handlers.get(name) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ if sub_step.optional => {
          event!(parent: &sub_step_span, Level::DEBUG, "Optional sub-step has no handlers, skipping.");
          continue;
        }
        _ => {
          event!(parent: &sub_step_span, Level::ERROR, "Non-optional sub-step has no handlers.");
          return Err(Err::from(FlowError::HandlerMissing {
            sub_step: sub_step.name.clone(),
          }));
        }
      };

      for (handler_idx, handler_fn) in handlers.iter().enumerate() {
        let handler_span = span!(parent: &sub_step_span, Level::DEBUG, "handler", handler_index = handler_idx);
        match handler_fn(ctx.clone()).instrument(handler_span).await {
          Ok(StepControl::Continue) => {}
          Ok(StepControl::Stop) => {
            event!(parent: &sub_step_span, Level::INFO, "Step stopped by a handler.");
            return Ok(StepOutcome::Stopped);
          }
          Err(e) if sub_step.optional => {
            event!(parent: &sub_step_span, Level::WARN, error = %e, "Optional sub-step failed; continuing.");
            ctx
              .events()
              .info(format!("  ⚠ {}: {}", name, truncate_diagnostic(&e.to_string())));
            break;
          }
          Err(e) => {
            event!(parent: &sub_step_span, Level::ERROR, error = %e, "Sub-step handler failed.");
            return Err(e);
          }
        }
      }
      event!(parent: &sub_step_span, Level::DEBUG, "Sub-step finished.");
    }

    event!(Level::DEBUG, "Step execution completed successfully.");
    Ok(StepOutcome::Completed)
  }
}
