//! Handlers for `/simulations` and `/scenarios`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/simulations` | Scenario body; 202 with `{"run_id": ...}` |
//! | `GET`  | `/simulations` | All runs |
//! | `GET`  | `/simulations/{id}` | 404 if unknown |
//! | `POST` | `/simulations/{id}/cancel` | Waits for the run to settle |
//! | `GET`  | `/scenarios` | Predefined scenario catalogue |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde_json::json;
use signalbox_core::{
  audit::AuditSink,
  simulation::{SimulationRun, SimulationScenario},
};
use signalbox_engine::Dispatcher;
use uuid::Uuid;

use crate::error::ApiError;

/// `POST /simulations`
pub async fn submit<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Json(scenario): Json<SimulationScenario>,
) -> Result<impl IntoResponse, ApiError> {
  if scenario.id.trim().is_empty() {
    return Err(ApiError::BadRequest("scenario id is required".to_owned()));
  }
  let run_id = dispatcher.simulate(scenario)?;
  Ok((StatusCode::ACCEPTED, Json(json!({ "run_id": run_id }))))
}

/// `GET /simulations`
pub async fn list<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
) -> Json<Vec<SimulationRun>> {
  Json(dispatcher.simulations().runs())
}

/// `GET /simulations/{id}`
pub async fn get_one<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SimulationRun>, ApiError> {
  Ok(Json(dispatcher.simulations().status(id)?))
}

/// `POST /simulations/{id}/cancel`
pub async fn cancel<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SimulationRun>, ApiError> {
  Ok(Json(dispatcher.simulations().cancel(id).await?))
}

/// `GET /scenarios`
pub async fn scenarios<A: AuditSink + 'static>(
  State(dispatcher): State<Arc<Dispatcher<A>>>,
) -> Json<Vec<SimulationScenario>> {
  Json(dispatcher.scenarios())
}
