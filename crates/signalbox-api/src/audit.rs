//! Handlers for `/audit` and `/stats`.
//!
//! `GET /audit` accepts every [`AuditQuery`] field as a query parameter, e.g.
//! `?actor=controller_001&overridden=true&limit=20`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use signalbox_core::audit::{AuditEntry, AuditQuery, AuditSink};
use signalbox_engine::{DecisionStats, Dispatcher};

use crate::error::ApiError;

/// `GET /audit`
pub async fn query<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
  let entries = dispatcher.audit().query(&query).await.map_err(ApiError::audit)?;
  Ok(Json(entries))
}

/// `GET /stats`
pub async fn stats<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
) -> Json<DecisionStats> {
  Json(dispatcher.board().stats())
}
