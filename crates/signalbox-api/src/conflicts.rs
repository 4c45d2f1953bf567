//! Handlers for `/conflicts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/conflicts` | Unresolved conflicts, soonest first |
//! | `GET`  | `/conflicts/{id}` | 404 if not on the board |
//! | `POST` | `/conflicts/{id}/resolve` | Body: `{"actor":"...","note":"..."}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;
use signalbox_core::{audit::AuditSink, conflict::Conflict};
use signalbox_engine::{ConflictView, Dispatcher};

use crate::error::ApiError;

/// `GET /conflicts`
pub async fn list<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
) -> Json<Vec<ConflictView>> {
  Json(dispatcher.board().active().await)
}

/// `GET /conflicts/{id}`
pub async fn get_one<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
) -> Result<Json<ConflictView>, ApiError> {
  Ok(Json(dispatcher.board().conflict(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub actor: String,
  #[serde(default)]
  pub note:  String,
}

/// `POST /conflicts/{id}/resolve`
pub async fn resolve<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
  Json(body): Json<ResolveBody>,
) -> Result<Json<Conflict>, ApiError> {
  if body.actor.trim().is_empty() {
    return Err(ApiError::BadRequest("actor is required".to_owned()));
  }
  let conflict = dispatcher.board().override_resolve(&id, &body.actor, &body.note).await?;
  Ok(Json(conflict))
}
