// nfviz/src/pipeline/definition.rs

//! Contains the `Pipeline<TData, Err>` struct definition and its construction.

use crate::core::context::Handler;
use crate::core::step::{SkipCondition, SubStepDef};
use std::collections::HashMap;

/// The body of one step: an ordered list of named sub-steps, each with its
/// handlers, run against a per-invocation `StepContext<TData>`.
///
/// `Err` is the error type handlers return. It must be `From<FlowError>` so
/// framework errors (a missing handler) can be reported through it.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<crate::error::FlowError> + Send + Sync + 'static,
{
  /// Ordered list of sub-step definitions.
  pub(crate) sub_steps: Vec<SubStepDef<TData>>,

  pub(crate) handlers: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<crate::error::FlowError> + Send + Sync + 'static,
{
  /// Creates a new `Pipeline` from `(name, optional, skip_if)` triples.
  pub fn new<S: AsRef<str>>(sub_step_defs: &[(S, bool, Option<SkipCondition<TData>>)]) -> Self {
    let sub_steps = sub_step_defs
      .iter()
      .map(|(name, optional, skip_cond_opt)| SubStepDef {
        name: name.as_ref().to_string(),
        optional: *optional,
        skip_if: skip_cond_opt.clone(),
      })
      .collect();

    Self {
      sub_steps,
      handlers: HashMap::new(),
    }
  }

  /// Panics if no sub-step with the given name exists. A typo in a sub-step
  /// name is a programming error caught at registration time.
  pub(crate) fn ensure_sub_step_exists(&self, sub_step: &str) {
    if !self.sub_steps.iter().any(|s| s.name == sub_step) {
      panic!("Step setup error: sub-step '{}' not found in pipeline definition.", sub_step);
    }
  }

  pub fn sub_step_names(&self) -> impl Iterator<Item = &str> {
    self.sub_steps.iter().map(|s| s.name.as_str())
  }

  pub fn len(&self) -> usize {
    self.sub_steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sub_steps.is_empty()
  }
}
