// nfviz/server/src/web/mod.rs

pub mod handlers;
pub mod routes;

use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;

pub use routes::configure_app_routes;

/// Permissive CORS headers added to every response; the browser client is
/// served from a different origin.
pub fn cors_headers() -> DefaultHeaders {
  DefaultHeaders::new()
    .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
    .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
    .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
}
