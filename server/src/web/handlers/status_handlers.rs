// nfviz/server/src/web/handlers/status_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;

pub async fn health_handler(app_state: web::Data<AppState>) -> HttpResponse {
  HttpResponse::Ok().json(json!({
    "status": "healthy",
    "project": app_state.config.run.project_id,
  }))
}

/// Task statuses reconciled from the batch job listing. An unreachable
/// listing is reported in the body, not as an HTTP error.
#[instrument(name = "handler::jobs_status", skip(app_state))]
pub async fn jobs_status_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let report = app_state.aggregator.reconciler().report().await;
  info!(jobs = report.job_count, ok = report.error.is_none(), "Jobs status computed.");
  Ok(HttpResponse::Ok().json(report))
}

#[instrument(name = "handler::status", skip(app_state))]
pub async fn status_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let snapshot = app_state.aggregator.snapshot().await;
  Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn preflight_handler() -> HttpResponse {
  HttpResponse::NoContent().finish()
}
