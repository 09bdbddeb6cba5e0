// nfviz/server/src/web/routes.rs

use crate::errors::AppError;
use crate::web::handlers::{execute_handlers, status_handlers};
use actix_web::{guard, web};

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  // Malformed bodies answer with the same JSON error shape as other failures.
  let json_config = web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into());

  cfg.service(
    web::scope("/api")
      .app_data(json_config)
      // Registered first: the guard lets every other method fall through.
      .service(
        web::resource("/{tail:.*}")
          .guard(guard::Options())
          .to(status_handlers::preflight_handler),
      )
      .route("/health", web::get().to(status_handlers::health_handler))
      .route("/execute", web::post().to(execute_handlers::execute_step_handler))
      .route("/jobs/status", web::get().to(status_handlers::jobs_status_handler))
      .route("/status", web::get().to(status_handlers::status_handler)),
  );
}
