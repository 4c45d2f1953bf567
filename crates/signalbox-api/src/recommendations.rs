//! Handlers for `/recommendations` endpoints.
//!
//! Every action carries the version the caller last saw; a mismatch is
//! answered with 409 and the caller should re-read before retrying.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;
use signalbox_core::{
  audit::AuditSink,
  recommendation::{Recommendation, Remedy},
};
use signalbox_engine::Dispatcher;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ActionBody {
  pub version: u64,
  pub actor:   String,
}

#[derive(Debug, Deserialize)]
pub struct ModifyBody {
  pub version: u64,
  pub actor:   String,
  pub remedy:  Remedy,
}

fn require_actor(actor: &str) -> Result<(), ApiError> {
  if actor.trim().is_empty() {
    return Err(ApiError::BadRequest("actor is required".to_owned()));
  }
  Ok(())
}

/// `GET /recommendations/{id}`
pub async fn get_one<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
) -> Result<Json<Recommendation>, ApiError> {
  Ok(Json(dispatcher.board().recommendation(&id).await?))
}

/// `POST /recommendations/{id}/accept`
pub async fn accept<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
  Json(body): Json<ActionBody>,
) -> Result<Json<Recommendation>, ApiError> {
  require_actor(&body.actor)?;
  Ok(Json(dispatcher.board().accept(&id, body.version, &body.actor).await?))
}

/// `POST /recommendations/{id}/reject`
pub async fn reject<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
  Json(body): Json<ActionBody>,
) -> Result<Json<Recommendation>, ApiError> {
  require_actor(&body.actor)?;
  Ok(Json(dispatcher.board().reject(&id, body.version, &body.actor).await?))
}

/// `POST /recommendations/{id}/implement`
pub async fn implement<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
  Json(body): Json<ActionBody>,
) -> Result<Json<Recommendation>, ApiError> {
  require_actor(&body.actor)?;
  Ok(Json(dispatcher.board().implement(&id, body.version, &body.actor).await?))
}

/// `POST /recommendations/{id}/modify`
pub async fn modify<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<String>,
  Json(body): Json<ModifyBody>,
) -> Result<Json<Recommendation>, ApiError> {
  require_actor(&body.actor)?;
  let rec = dispatcher
    .board()
    .modify(&id, body.version, &body.actor, body.remedy)
    .await?;
  Ok(Json(rec))
}
