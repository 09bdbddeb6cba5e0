// nfviz/server/src/web/handlers/execute_handlers.rs

use actix_web::http::header;
use actix_web::web::{self, Bytes};
use actix_web::HttpResponse;
use futures_util::StreamExt;
use nfviz::{sse, StepRequest};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequestPayload {
  /// Missing ids run as the empty id, which streams an unknown-step error.
  #[serde(default)]
  pub step_id: String,
  pub phase: Option<String>,
}

/// Runs one step and streams its events as Server-Sent Events. Step failures
/// travel inside the stream; the response itself is always 200.
#[instrument(
  name = "handler::execute_step",
  skip(app_state, payload),
  fields(step_id = %payload.step_id, phase = ?payload.phase, execution_id = %Uuid::new_v4())
)]
pub async fn execute_step_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ExecuteRequestPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let mut request = StepRequest::new(payload.step_id);
  if let Some(phase) = payload.phase {
    request = request.with_phase(phase);
  }
  info!(phase = request.phase_or_default(), "Streaming step execution.");

  let frames = sse::frames(app_state.registry.execute(request)).map(|frame| Ok::<_, Infallible>(Bytes::from(frame)));

  Ok(
    HttpResponse::Ok()
      .content_type(sse::CONTENT_TYPE)
      .insert_header((header::CACHE_CONTROL, "no-cache"))
      .insert_header(("X-Accel-Buffering", "no"))
      .streaming(frames),
  )
}

#[cfg(test)]
mod tests {
  use crate::config::StepSettings;
  use crate::state::AppState;
  use crate::testing::{app_config, collaborators, FakeCloud};
  use crate::web::{configure_app_routes, cors_headers};
  use actix_web::{http::StatusCode, test, web as actix_data, App};
  use std::sync::Arc;

  fn state(cloud: &Arc<FakeCloud>) -> AppState {
    AppState::new(Arc::new(app_config(StepSettings::default())), collaborators(cloud)).expect("state builds")
  }

  #[actix_web::test]
  async fn execute_streams_sse_frames() {
    let cloud = FakeCloud::shared();
    cloud.put_bucket("wz-workload-viz-bucket", "US-CENTRAL1");
    let app = test::init_service(
      App::new()
        .app_data(actix_data::Data::new(state(&cloud)))
        .wrap(cors_headers())
        .configure(configure_app_routes),
    )
    .await;

    let req = test::TestRequest::post()
      .uri("/api/execute")
      .set_json(serde_json::json!({"stepId": "create-bucket", "phase": "setup"}))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers.get("content-type").and_then(|v| v.to_str().ok()), Some("text/event-stream"));
    assert_eq!(headers.get("cache-control").and_then(|v| v.to_str().ok()), Some("no-cache"));
    assert_eq!(headers.get("x-accel-buffering").and_then(|v| v.to_str().ok()), Some("no"));

    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).expect("utf-8 body");
    let frames: Vec<&str> = text.split_terminator("\n\n").collect();
    assert!(frames.iter().all(|f| f.starts_with("data: ")));
    assert!(text.contains("Bucket already exists: gs://wz-workload-viz-bucket"));
    let last = frames.last().expect("at least one frame");
    assert!(last.contains(r#""status":"complete""#), "{last}");
    assert_eq!(cloud.created_buckets(), 0);
  }

  #[actix_web::test]
  async fn unknown_step_is_an_error_frame_not_an_http_error() {
    let cloud = FakeCloud::shared();
    let app = test::init_service(
      App::new()
        .app_data(actix_data::Data::new(state(&cloud)))
        .configure(configure_app_routes),
    )
    .await;

    let req = test::TestRequest::post()
      .uri("/api/execute")
      .set_json(serde_json::json!({"stepId": "does-not-exist"}))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).expect("utf-8 body");
    assert!(text.contains("Unknown step: does-not-exist"));
    assert_eq!(text.matches(r#""status":"error""#).count(), 1);
  }

  #[actix_web::test]
  async fn malformed_body_is_a_bad_request() {
    let cloud = FakeCloud::shared();
    let app = test::init_service(
      App::new()
        .app_data(actix_data::Data::new(state(&cloud)))
        .configure(configure_app_routes),
    )
    .await;

    let req = test::TestRequest::post()
      .uri("/api/execute")
      .insert_header(("content-type", "application/json"))
      .set_payload("{not json")
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }
}
