// nfviz/src/classify.rs

//! Turns free-text pipeline output into task transitions.
//!
//! Matching is a best-effort heuristic over unstructured text. Rules are kept
//! as an ordered table of independent extractors; the first rule that yields a
//! task wins, so precedence is exactly the table order.

use crate::core::event::Severity;
use crate::status::{TaskId, TaskStatus};
use regex::Regex;
use std::sync::LazyLock;

static SUBMITTED_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"Submitted process\s*>\s*([A-Za-z0-9_:.\-]+)").expect("submitted-process regex must compile")
});

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\[[0-9a-f]{2}/[0-9a-f]{6}\]\s+(?:process\s*>\s*)?([A-Za-z0-9_:.\-]+).*\[\s*100%\s*\]")
    .expect("progress regex must compile")
});

const SUCCESS_MARKERS: &[&str] = &["✔", "✓", "COMPLETED", "SUCCEEDED"];

const FAILURE_MARKERS: &[&str] = &["✘", "ERROR", "FAILED", "Error executing process", "terminated with an error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
  Submitted,
  ProgressComplete,
  SuccessMarker,
  FailureMarker,
}

impl RuleKind {
  pub fn status(self) -> TaskStatus {
    match self {
      RuleKind::Submitted => TaskStatus::Running,
      RuleKind::ProgressComplete | RuleKind::SuccessMarker => TaskStatus::Complete,
      RuleKind::FailureMarker => TaskStatus::Error,
    }
  }
}

/// One classification rule: a predicate/extractor returning the task it names.
#[derive(Clone, Copy)]
pub struct Rule {
  pub kind: RuleKind,
  extract: fn(&str) -> Option<TaskId>,
}

impl Rule {
  pub fn apply(&self, line: &str) -> Option<TaskId> {
    (self.extract)(line)
  }
}

impl std::fmt::Debug for Rule {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Rule").field("kind", &self.kind).finish()
  }
}

/// Rules in priority order.
pub const RULES: &[Rule] = &[
  Rule {
    kind: RuleKind::Submitted,
    extract: submitted_task,
  },
  Rule {
    kind: RuleKind::ProgressComplete,
    extract: completed_progress_task,
  },
  Rule {
    kind: RuleKind::SuccessMarker,
    extract: success_marker_task,
  },
  Rule {
    kind: RuleKind::FailureMarker,
    extract: failure_marker_task,
  },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
  pub task: TaskId,
  pub status: TaskStatus,
  pub rule: RuleKind,
  pub message: String,
}

/// Classifies one output line. Lines that match no rule yield `None`; that is
/// not an error, the caller still forwards them as plain log lines.
///
/// When a line names several tasks the first one in declaration order is
/// used.
pub fn classify(line: &str) -> Option<Classification> {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    return None;
  }
  RULES.iter().find_map(|rule| {
    rule.apply(trimmed).map(|task| Classification {
      task,
      status: rule.kind.status(),
      rule: rule.kind,
      message: trimmed.to_string(),
    })
  })
}

/// Severity of a raw output line when it is forwarded as a log event.
pub fn line_severity(line: &str) -> Severity {
  if line.contains("ERROR") || line.contains("WARN") {
    Severity::Error
  } else if ["Submitted", "✓", "✔", "SUCCEEDED"].iter().any(|m| line.contains(m)) {
    Severity::Success
  } else {
    Severity::Info
  }
}

fn submitted_task(line: &str) -> Option<TaskId> {
  let caps = SUBMITTED_RE.captures(line)?;
  TaskId::from_label(caps.get(1)?.as_str())
}

fn completed_progress_task(line: &str) -> Option<TaskId> {
  let caps = PROGRESS_RE.captures(line)?;
  TaskId::from_label(caps.get(1)?.as_str())
}

fn success_marker_task(line: &str) -> Option<TaskId> {
  marker_task(line, SUCCESS_MARKERS)
}

fn failure_marker_task(line: &str) -> Option<TaskId> {
  marker_task(line, FAILURE_MARKERS)
}

fn marker_task(line: &str, markers: &[&str]) -> Option<TaskId> {
  if markers.iter().any(|m| line.contains(m)) {
    TaskId::find_word_in(line)
  } else {
    None
  }
}
