// nfviz/server/src/errors.rs

use actix_web::{HttpResponse, ResponseError};
use nfviz::{ExternalError, FlowError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Validation Error: {0}")]
  Validation(String),

  #[error(transparent)]
  Workflow(#[from] FlowError),

  /// A collaborator call failed; the message is the provider's own.
  #[error(transparent)]
  External(#[from] ExternalError),

  /// The external pipeline process failed; shown to the caller verbatim.
  #[error("{0}")]
  Pipeline(String),

  #[error("I/O Error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

// Glue code returning anyhow::Result converts through here; known error types
// keep their variant so steps can still branch on them.
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    let err = match err.downcast::<ExternalError>() {
      Ok(external) => return AppError::External(external),
      Err(err) => err,
    };
    let err = match err.downcast::<FlowError>() {
      Ok(flow) => return AppError::Workflow(flow),
      Err(err) => err,
    };
    match err.downcast::<std::io::Error>() {
      Ok(io) => AppError::Io(io),
      Err(err) => AppError::Internal(format!("{err:#}")),
    }
  }
}

impl ResponseError for AppError {
  fn error_response(&self) -> HttpResponse {
    tracing::error!(application_error = %self, "Responding with error");
    match self {
      AppError::Validation(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::Config(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "Configuration issue", "detail": m}))
      }
      AppError::External(e) if e.is_not_found() => HttpResponse::NotFound().json(json!({"error": e.to_string()})),
      AppError::External(e) => {
        HttpResponse::BadGateway().json(json!({"error": "Cloud API error", "detail": e.to_string()}))
      }
      AppError::Workflow(source) => {
        tracing::error!(flow_error_source = ?source, "Workflow error details");
        HttpResponse::InternalServerError()
          .json(json!({"error": "Workflow processing error", "detail": source.to_string()}))
      }
      AppError::Pipeline(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "Pipeline error", "detail": m}))
      }
      AppError::Io(e) => {
        HttpResponse::InternalServerError().json(json!({"error": "I/O error", "detail": e.to_string()}))
      }
      AppError::Internal(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "An internal error occurred", "detail": m}))
      }
    }
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
