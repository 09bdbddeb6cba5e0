// nfviz/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// How an external provisioning API answered a failed call.
///
/// Steps branch on this instead of on raw status codes: `NotFound` sends an
/// idempotent step down its creation branch, `AlreadyExists` counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalErrorKind {
  NotFound,
  AlreadyExists,
  Failed,
}

/// Failure reported by one of the external collaborators (object store, IAM,
/// network, notebooks, batch jobs, service usage).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExternalError {
  pub kind: ExternalErrorKind,
  pub message: String,
}

impl ExternalError {
  pub fn not_found(message: impl Into<String>) -> Self {
    Self {
      kind: ExternalErrorKind::NotFound,
      message: message.into(),
    }
  }

  pub fn already_exists(message: impl Into<String>) -> Self {
    Self {
      kind: ExternalErrorKind::AlreadyExists,
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self {
      kind: ExternalErrorKind::Failed,
      message: message.into(),
    }
  }

  /// Classifies an HTTP status returned by a REST collaborator.
  /// 404 is not-found, 409 is already-exists, everything else is a failure.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    let message = message.into();
    match status {
      404 => Self::not_found(message),
      409 => Self::already_exists(message),
      _ => Self::failed(format!("HTTP {status}: {message}")),
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.kind == ExternalErrorKind::NotFound
  }

  pub fn is_already_exists(&self) -> bool {
    self.kind == ExternalErrorKind::AlreadyExists
  }
}

pub type ExternalResult<T> = std::result::Result<T, ExternalError>;

#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Unknown step: {step_id}")]
  StepNotFound { step_id: String },

  #[error("Handler missing for non-optional sub-step: {sub_step}")]
  HandlerMissing { sub_step: String },

  #[error(transparent)]
  External(#[from] ExternalError),

  #[error("{source}")]
  Handler {
    #[source]
    source: AnyhowError,
  },

  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("Timed out after {waited_secs}s waiting for {what}")]
  Timeout { what: String, waited_secs: u64 },

  #[error("Internal error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for FlowError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap an ExternalError that travelled through anyhow so callers can still
    // branch on its kind.
    match err.downcast::<ExternalError>() {
      Ok(external) => FlowError::External(external),
      Err(err) => FlowError::Handler { source: err },
    }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_codes_map_onto_the_taxonomy() {
    assert!(ExternalError::from_status(404, "gone").is_not_found());
    assert!(ExternalError::from_status(409, "dup").is_already_exists());
    let other = ExternalError::from_status(503, "unavailable");
    assert_eq!(other.kind, ExternalErrorKind::Failed);
    assert_eq!(other.to_string(), "HTTP 503: unavailable");
  }

  #[test]
  fn anyhow_keeps_external_kind() {
    let err: FlowError = AnyhowError::new(ExternalError::not_found("bucket")).into();
    match err {
      FlowError::External(e) => assert!(e.is_not_found()),
      other => panic!("expected External, got {other:?}"),
    }
  }
}
