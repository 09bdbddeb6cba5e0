// nfviz/src/core/control.rs

//! Signals for controlling sub-step flow and the outcome of a step run.

/// Signal from a handler indicating whether the step should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  /// Continue with the remaining handlers and sub-steps.
  Continue,
  /// Finish the step now. This is a successful ending: the remaining
  /// sub-steps are skipped and the stream terminates with `complete`.
  Stop,
}

/// Outcome of a step that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  /// Every non-skipped sub-step ran.
  Completed,
  /// A handler returned `StepControl::Stop`.
  Stopped,
}
