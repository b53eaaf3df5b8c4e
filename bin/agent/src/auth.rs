//! Validates the `X-Deploy-Auth` header every route requires (`spec.md` §4.H,
//! shared with the caller side via `drydock_client::api::AUTH_HEADER`).

use axum::{
  body::Body,
  extract::State,
  http::{Request, StatusCode},
  middleware::Next,
  response::{IntoResponse, Response},
};
use drydock_client::api::AUTH_HEADER;
use serror::AddStatusCodeError;

use crate::state::AgentRuntime;

pub async fn require_shared_secret(
  State(runtime): State<std::sync::Arc<AgentRuntime>>,
  request: Request<Body>,
  next: Next,
) -> Response {
  let provided = request.headers().get(AUTH_HEADER).and_then(|v| v.to_str().ok());
  match provided {
    Some(secret) if secret == runtime.config.shared_secret => next.run(request).await,
    _ => anyhow::anyhow!("missing or invalid X-Deploy-Auth header")
      .status_code(StatusCode::UNAUTHORIZED)
      .into_response(),
  }
}
