// nfviz/src/core/event.rs

//! Progress events produced while a step runs, and the sink handlers emit them through.

use crate::status::{TaskId, TaskStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{event, Level};

/// Longest diagnostic carried by a terminal error event, in characters.
pub const MAX_DIAGNOSTIC_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Success,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
  Complete,
  Error,
}

/// One unit of streamed progress.
///
/// A well-formed stream ends with exactly one `Terminal` event and contains no
/// other. Handlers cannot produce `Terminal` events; only the executor does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  Log { message: String, severity: Severity },
  TaskUpdate { task: TaskId, status: TaskStatus, message: String },
  Terminal { status: TerminalStatus, message: String },
}

impl Event {
  pub fn log(severity: Severity, message: impl Into<String>) -> Self {
    Event::Log {
      message: message.into(),
      severity,
    }
  }

  pub(crate) fn complete() -> Self {
    Event::Terminal {
      status: TerminalStatus::Complete,
      message: "✓ Done".to_string(),
    }
  }

  pub(crate) fn failed(diagnostic: &str) -> Self {
    Event::Terminal {
      status: TerminalStatus::Error,
      message: format!("✗ {}", truncate_diagnostic(diagnostic)),
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Event::Terminal { .. })
  }
}

/// Cuts `text` to [`MAX_DIAGNOSTIC_CHARS`] on a char boundary, marking the cut.
pub fn truncate_diagnostic(text: &str) -> String {
  let text = text.trim();
  if text.chars().count() <= MAX_DIAGNOSTIC_CHARS {
    return text.to_string();
  }
  let mut cut: String = text.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
  cut.push('…');
  cut
}

/// Write side of a step's event stream.
///
/// Sending never fails from the handler's point of view: if the consumer is
/// gone (caller disconnected) events are dropped and the step keeps running
/// until its next suspension point is cancelled.
#[derive(Debug, Clone)]
pub struct EventSink {
  tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
  }

  fn send(&self, event: Event) {
    if self.tx.send(event).is_err() {
      event!(Level::TRACE, "Event consumer dropped; discarding event.");
    }
  }

  pub fn log(&self, severity: Severity, message: impl Into<String>) {
    self.send(Event::log(severity, message));
  }

  pub fn info(&self, message: impl Into<String>) {
    self.log(Severity::Info, message);
  }

  pub fn success(&self, message: impl Into<String>) {
    self.log(Severity::Success, message);
  }

  pub fn error(&self, message: impl Into<String>) {
    self.log(Severity::Error, message);
  }

  pub fn task_update(&self, task: TaskId, status: TaskStatus, message: impl Into<String>) {
    self.send(Event::TaskUpdate {
      task,
      status,
      message: message.into(),
    });
  }
}
