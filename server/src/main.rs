// nfviz/server/src/main.rs

mod config;
mod errors;
mod gcp;
mod state;
mod steps;
mod web;

#[cfg(test)]
mod testing;

use crate::config::{AppConfig, LogFormat};
use crate::gcp::GcpRest;
use crate::state::AppState;
use crate::web::{configure_app_routes, cors_headers};

use actix_web::{web as actix_data, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    // Step spans report their duration when they close.
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Pretty => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  // The log format is itself configuration, so tracing starts after loading it.
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => {
      init_tracing(cfg.log_format);
      Arc::new(cfg)
    }
    Err(e) => {
      init_tracing(LogFormat::Pretty);
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };

  tracing::info!(
    project = %app_config.run.project_id,
    bucket = %app_config.run.bucket_name,
    region = %app_config.run.region,
    "Starting Nextflow workload visualizer backend..."
  );

  let rest = match GcpRest::from_environment().await {
    Ok(rest) => Arc::new(rest),
    Err(e) => {
      tracing::error!(error = %e, "Failed to initialize Google Cloud access.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };
  let cloud = gcp::collaborators(rest, &app_config);

  let app_state = match AppState::new(app_config.clone(), cloud) {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to register steps.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(cors_headers())
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
