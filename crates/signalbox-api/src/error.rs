//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use signalbox_core::Error as CoreError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request lost a race or targets a state that no longer allows it.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn audit<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Internal(Box::new(e))
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    match e {
      e if e.is_not_found() => Self::NotFound(e.to_string()),
      e if e.is_conflict() => Self::Conflict(e.to_string()),
      CoreError::InvalidSnapshot(_) | CoreError::InvalidConflict(_) => {
        Self::BadRequest(e.to_string())
      }
      CoreError::InvalidRemedy(_) => Self::Unprocessable(e.to_string()),
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_errors_map_to_status_families() {
    let status = |e: CoreError| ApiError::from(e).into_response().status();
    assert_eq!(status(CoreError::ConflictNotFound("C".into())), StatusCode::NOT_FOUND);
    assert_eq!(
      status(CoreError::StaleVersion { id: "R".into(), expected: 1, actual: 2 }),
      StatusCode::CONFLICT
    );
    assert_eq!(status(CoreError::AlreadyRunning("S".into())), StatusCode::CONFLICT);
    assert_eq!(status(CoreError::InvalidSnapshot("x".into())), StatusCode::BAD_REQUEST);
    assert_eq!(
      status(CoreError::InvalidRemedy("x".into())),
      StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
      status(CoreError::Audit(Box::new(std::io::Error::other("disk full")))),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }
}
