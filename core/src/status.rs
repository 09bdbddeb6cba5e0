// nfviz/src/status.rs

//! The task-status model shared by the log-line classifier and the job reconciler.
//!
//! A [`StatusMap`] always holds every [`TaskId`]. Updates go through
//! [`StatusMap::observe`], which refuses downgrades: once a task is `complete`
//! only an `error` observation can move it again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical pipeline stages, in declaration order.
///
/// `Results` is a pseudo-task derived from the others; it never comes from a
/// log line or a job name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskId {
  Index,
  Fastqc,
  Quant,
  Multiqc,
  Results,
}

impl TaskId {
  pub const ALL: [TaskId; 5] = [
    TaskId::Index,
    TaskId::Fastqc,
    TaskId::Quant,
    TaskId::Multiqc,
    TaskId::Results,
  ];

  /// Every task backed by a real pipeline process.
  pub const PIPELINE: [TaskId; 4] = [TaskId::Index, TaskId::Fastqc, TaskId::Quant, TaskId::Multiqc];

  pub fn as_str(self) -> &'static str {
    match self {
      TaskId::Index => "index",
      TaskId::Fastqc => "fastqc",
      TaskId::Quant => "quant",
      TaskId::Multiqc => "multiqc",
      TaskId::Results => "results",
    }
  }

  pub fn is_pipeline_task(self) -> bool {
    self != TaskId::Results
  }

  /// Resolves a process label such as `RNASEQ:FASTQC`, `'RNASEQ:QUANT (ggal)'`
  /// or `multiqc`. Only the segment after the last `:` counts.
  pub fn from_label(label: &str) -> Option<TaskId> {
    let bare = label
      .trim()
      .trim_matches(|c| c == '\'' || c == '"')
      .split_whitespace()
      .next()?;
    let name = bare.rsplit(':').next()?;
    Self::PIPELINE
      .into_iter()
      .find(|task| name.eq_ignore_ascii_case(task.as_str()))
  }

  /// First pipeline task (declaration order) that appears as a whole word in
  /// `text`. Words are split on anything that is not alphanumeric or `_`, which
  /// makes `WORKFLOW:TASKNAME` and `TASKNAME` resolve the same way.
  pub fn find_word_in(text: &str) -> Option<TaskId> {
    let words: Vec<&str> = text
      .split(|c: char| !(c.is_alphanumeric() || c == '_'))
      .filter(|w| !w.is_empty())
      .collect();
    Self::PIPELINE
      .into_iter()
      .find(|task| words.iter().any(|w| w.eq_ignore_ascii_case(task.as_str())))
  }

  /// First pipeline task (declaration order) whose name occurs anywhere in
  /// `text`, ignoring case. Used for external job names like `nf-FASTQC-1`.
  pub fn find_substring_in(text: &str) -> Option<TaskId> {
    let lowered = text.to_ascii_lowercase();
    Self::PIPELINE
      .into_iter()
      .find(|task| lowered.contains(task.as_str()))
  }
}

impl std::fmt::Display for TaskId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  #[default]
  Pending,
  Running,
  Complete,
  Error,
}

impl TaskStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Pending => "pending",
      TaskStatus::Running => "running",
      TaskStatus::Complete => "complete",
      TaskStatus::Error => "error",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, TaskStatus::Complete | TaskStatus::Error)
  }

  /// Whether moving from `self` to `next` is allowed.
  ///
  /// - `error` may replace anything, including `complete`.
  /// - `complete` may replace anything (a retried task that finally succeeds).
  /// - `running` may only replace `pending` or `error` (a resubmission).
  /// - nothing moves back to `pending`.
  pub fn accepts(self, next: TaskStatus) -> bool {
    if self == next {
      return false;
    }
    match next {
      TaskStatus::Error | TaskStatus::Complete => true,
      TaskStatus::Running => matches!(self, TaskStatus::Pending | TaskStatus::Error),
      TaskStatus::Pending => false,
    }
  }
}

impl std::fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Status of every known task for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMap(BTreeMap<TaskId, TaskStatus>);

impl Default for StatusMap {
  fn default() -> Self {
    Self::new()
  }
}

impl StatusMap {
  /// A map with every task `pending`.
  pub fn new() -> Self {
    StatusMap(TaskId::ALL.into_iter().map(|t| (t, TaskStatus::Pending)).collect())
  }

  pub fn get(&self, task: TaskId) -> TaskStatus {
    self.0.get(&task).copied().unwrap_or_default()
  }

  pub fn iter(&self) -> impl Iterator<Item = (TaskId, TaskStatus)> + '_ {
    self.0.iter().map(|(t, s)| (*t, *s))
  }

  /// Applies an observation if it is not a downgrade. Returns whether the
  /// stored status changed.
  pub fn observe(&mut self, task: TaskId, status: TaskStatus) -> bool {
    let current = self.get(task);
    if current.accepts(status) {
      self.0.insert(task, status);
      true
    } else {
      false
    }
  }

  /// Folds a later map into this one, observation by observation.
  pub fn merge(&mut self, later: &StatusMap) {
    for (task, status) in later.iter() {
      self.observe(task, status);
    }
  }

  /// Any task currently running.
  pub fn pipeline_running(&self) -> bool {
    self.iter().any(|(_, s)| s == TaskStatus::Running)
  }

  /// Every real pipeline task is complete.
  pub fn all_complete(&self) -> bool {
    TaskId::PIPELINE
      .into_iter()
      .all(|t| self.get(t) == TaskStatus::Complete)
  }

  /// Recomputes the `results` pseudo-task from the pipeline tasks and returns
  /// its status when it changed.
  ///
  /// All pipeline tasks complete marks results complete; otherwise any
  /// running or complete pipeline task marks results running.
  pub fn derive_results(&mut self) -> Option<TaskStatus> {
    let derived = if self.all_complete() {
      TaskStatus::Complete
    } else if TaskId::PIPELINE
      .into_iter()
      .any(|t| matches!(self.get(t), TaskStatus::Running | TaskStatus::Complete))
    {
      TaskStatus::Running
    } else {
      return None;
    };
    if self.observe(TaskId::Results, derived) {
      Some(derived)
    } else {
      None
    }
  }
}
