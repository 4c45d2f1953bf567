//! Handlers for `/snapshot` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT`  | `/snapshot` | Replace the network; returns the refreshed board |
//! | `GET`  | `/snapshot` | Current snapshot |
//! | `GET`  | `/snapshot/sections` | Per-section load and status |

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;
use signalbox_core::{audit::AuditSink, network::NetworkSnapshot};
use signalbox_engine::{ConflictView, Dispatcher, RefreshSummary, SectionSummary};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct BoardResponse {
  pub refresh:   RefreshSummary,
  pub conflicts: Vec<ConflictView>,
}

/// `PUT /snapshot`
pub async fn replace<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Json(snapshot): Json<NetworkSnapshot>,
) -> Result<Json<BoardResponse>, ApiError> {
  let refresh = dispatcher.ingest(snapshot).await?;
  let conflicts = dispatcher.board().active().await;
  Ok(Json(BoardResponse { refresh, conflicts }))
}

/// `GET /snapshot`
pub async fn get_one<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
) -> Json<NetworkSnapshot> {
  Json(dispatcher.snapshot().as_ref().clone())
}

/// `GET /snapshot/sections`
pub async fn sections<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
) -> Json<Vec<SectionSummary>> {
  Json(dispatcher.sections().await)
}
