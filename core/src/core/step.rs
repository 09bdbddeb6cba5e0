// nfviz/src/core/step.rs

//! Defines the structure for a single sub-step within a step pipeline.

use super::StepContext;
use std::sync::Arc;

/// Evaluated before a sub-step runs; `true` skips it.
pub type SkipCondition<TData> = Arc<dyn Fn(&StepContext<TData>) -> bool + Send + Sync + 'static>;

/// Definition of a sub-step: its name, whether its failure is tolerated, and
/// an optional skip condition.
#[derive(Clone)]
pub struct SubStepDef<T: 'static + Send + Sync> {
  pub name: String,
  /// A failing optional sub-step is reported as a warning and the step
  /// carries on. An optional sub-step without handlers is skipped.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: 'static + Send + Sync> std::fmt::Debug for SubStepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SubStepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
