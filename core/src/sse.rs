// nfviz/src/sse.rs

//! Event Stream Encoder: one [`Event`] in, one self-delimiting Server-Sent
//! Events frame out.

use crate::core::event::{Event, Severity, TerminalStatus};
use crate::core::stream::EventStream;
use crate::status::{TaskId, TaskStatus};
use futures_util::{Stream, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{event, Level};

pub const CONTENT_TYPE: &str = "text/event-stream";

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
    .expect("ANSI escape regex must compile")
});

/// JSON body of a frame. Field names are what the browser client reads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Frame {
  log: String,
  #[serde(rename = "type")]
  severity: Severity,
  #[serde(skip_serializing_if = "Option::is_none")]
  task_id: Option<TaskId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  task_status: Option<TaskStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  status: Option<TerminalStatus>,
}

impl Frame {
  fn from_event(ev: &Event) -> Self {
    match ev {
      Event::Log { message, severity } => Frame {
        log: sanitize(message),
        severity: *severity,
        task_id: None,
        task_status: None,
        status: None,
      },
      Event::TaskUpdate { task, status, message } => Frame {
        log: sanitize(message),
        severity: Severity::Info,
        task_id: Some(*task),
        task_status: Some(*status),
        status: None,
      },
      Event::Terminal { status, message } => Frame {
        log: sanitize(message),
        severity: match status {
          TerminalStatus::Complete => Severity::Success,
          TerminalStatus::Error => Severity::Error,
        },
        task_id: None,
        task_status: None,
        status: Some(*status),
      },
    }
  }
}

/// Removes ANSI escape sequences and every control character except tab.
pub fn sanitize(text: &str) -> String {
  ANSI_RE
    .replace_all(text, "")
    .chars()
    .filter(|c| *c == '\t' || !c.is_control())
    .collect()
}

/// Encodes `ev` as `data: <json>\n\n`.
pub fn encode(ev: &Event) -> String {
  match serde_json::to_string(&Frame::from_event(ev)) {
    Ok(json) => format!("data: {json}\n\n"),
    Err(err) => {
      // Cannot happen for this frame shape; keep the stream well-formed anyway.
      event!(Level::ERROR, error = %err, "Failed to serialize event frame.");
      "data: {\"log\":\"unencodable event\",\"type\":\"error\"}\n\n".to_string()
    }
  }
}

/// Maps an event stream to its wire frames, preserving order.
pub fn frames(events: EventStream) -> impl Stream<Item = String> + Send + 'static {
  events.map(|ev| encode(&ev))
}
