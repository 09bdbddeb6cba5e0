// nfviz/server/src/steps/common.rs

//! Helpers shared by several steps.

use crate::errors::AppError;
use crate::steps::contexts::StepEnv;
use nfviz::external::{Operation, OperationScope};
use nfviz::{poll_until_done, EventSink, ExternalError, PollOutcome};
use std::time::Duration;
use tracing::{event, instrument, Level};

/// Waits for a compute long-running operation within the network budget.
///
/// Returns `Ok(true)` when the operation finished, `Ok(false)` when the budget
/// ran out (the caller reports the resource as still in progress and the step
/// carries on). A finished operation carrying an error fails the step.
#[instrument(name = "steps::wait_for_compute_operation", skip(env, events, operation), fields(operation = %operation.name))]
pub async fn wait_for_compute_operation(
  env: &StepEnv,
  events: &EventSink,
  scope: OperationScope,
  operation: Operation,
  what: &str,
) -> Result<bool, AppError> {
  let finished = if operation.done {
    operation
  } else {
    events.info(format!("  Waiting for {what}..."));
    let network = &*env.cloud.network;
    let project = env.run.project_id.as_str();
    let scope = &scope;
    let name = operation.name.as_str();
    let budget = env.poll_budget(env.settings.network_wait);
    let outcome = poll_until_done(budget, move || async move {
      network
        .get_operation(project, scope, name)
        .await
        .map(|op| op.done.then_some(op))
    })
    .await?;
    match outcome {
      PollOutcome::Done(op) => op,
      PollOutcome::TimedOut { waited } => {
        report_still_running(events, what, waited);
        return Ok(false);
      }
    }
  };

  match finished.error {
    Some(message) => Err(ExternalError::failed(format!("{what} failed: {message}")).into()),
    None => Ok(true),
  }
}

pub fn report_still_running(events: &EventSink, what: &str, waited: Duration) {
  event!(Level::WARN, %what, waited_secs = waited.as_secs(), "Gave up waiting; operation still in progress.");
  events.info(format!(
    "  {what} still in progress after {}s; it will finish in the background",
    waited.as_secs()
  ));
}

/// Shortens a provider message for a one-line log.
pub fn short(message: &str, max_chars: usize) -> String {
  message.chars().take(max_chars).collect()
}
