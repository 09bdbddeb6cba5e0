// nfviz/src/core/context.rs

//! Defines `StepContext<TData>`, the value every sub-step handler receives, and
//! the `Handler<TData, Err>` type itself.

use super::event::EventSink;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What the caller asked for: the step identifier and an optional phase label
/// (`setup`, `pipeline`, ...). The phase is informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRequest {
  pub step_id: String,
  pub phase: Option<String>,
}

impl StepRequest {
  pub fn new(step_id: impl Into<String>) -> Self {
    Self {
      step_id: step_id.into(),
      phase: None,
    }
  }

  pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
    self.phase = Some(phase.into());
    self
  }

  pub fn phase_or_default(&self) -> &str {
    self.phase.as_deref().unwrap_or("setup")
  }
}

/// Per-invocation state of one step run.
///
/// The data is shared between the sub-steps of a single run and discarded
/// afterwards; steps keep nothing between invocations.
///
/// IMPORTANT: guards returned by `read`/`write` are blocking and MUST be
/// dropped before any `.await`.
pub struct StepContext<T: Send + Sync + 'static> {
  data: Arc<RwLock<T>>,
  events: EventSink,
  request: Arc<StepRequest>,
}

impl<T: Send + Sync + 'static> StepContext<T> {
  pub fn new(data: T, events: EventSink, request: StepRequest) -> Self {
    Self {
      data: Arc::new(RwLock::new(data)),
      events,
      request: Arc::new(request),
    }
  }

  pub fn read(&self) -> RwLockReadGuard<'_, T> {
    self.data.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, T> {
    self.data.write()
  }

  pub fn events(&self) -> &EventSink {
    &self.events
  }

  pub fn request(&self) -> &StepRequest {
    &self.request
  }
}

impl<T: Send + Sync + 'static> Clone for StepContext<T> {
  fn clone(&self) -> Self {
    Self {
      data: Arc::clone(&self.data),
      events: self.events.clone(),
      request: Arc::clone(&self.request),
    }
  }
}

/// A sub-step handler: takes a clone of the step context and resolves to the
/// next control signal or the pipeline's error type.
///
/// Handlers emit their own progress through `ctx.events()`. They never emit a
/// terminal event; the executor derives it from the returned `Result`.
pub type Handler<TData, Err> = Box<
  dyn Fn(StepContext<TData>) -> Pin<Box<dyn Future<Output = Result<super::StepControl, Err>> + Send>>
    + Send
    + Sync,
>;
