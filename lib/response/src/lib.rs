//! A thin JSON response envelope for the handful of axum handlers in
//! `bin/control` and `bin/agent`. Errors go through [`serror`]'s
//! `Result`/`Json` wrappers directly; this crate only covers the success
//! side, so a handler's signature reads `serror::Result<Response<T>>`.

use axum::response::{IntoResponse, Json};
use serde::Serialize;

/// Wraps any serializable payload as a `200 OK` JSON body.
pub struct Response<T>(pub T);

impl<T: Serialize> IntoResponse for Response<T> {
  fn into_response(self) -> axum::response::Response {
    Json(self.0).into_response()
  }
}

impl<T> From<T> for Response<T> {
  fn from(value: T) -> Self {
    Response(value)
  }
}
