//! JSON REST API for Signalbox.
//!
//! Exposes an axum [`Router`] backed by a [`Dispatcher`] over any
//! [`AuditSink`]. Auth, TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", signalbox_api::api_router(dispatcher.clone()))
//! ```

pub mod audit;
pub mod conflicts;
pub mod error;
pub mod recommendations;
pub mod simulations;
pub mod snapshot;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use signalbox_core::audit::AuditSink;
use signalbox_engine::Dispatcher;

pub use error::ApiError;

/// Build a fully-materialised API router for `dispatcher`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<A>(dispatcher: Arc<Dispatcher<A>>) -> Router<()>
where
  A: AuditSink + 'static,
{
  Router::new()
    // Snapshot
    .route("/snapshot", get(snapshot::get_one::<A>).put(snapshot::replace::<A>))
    .route("/snapshot/sections", get(snapshot::sections::<A>))
    // Conflicts
    .route("/conflicts", get(conflicts::list::<A>))
    .route("/conflicts/{id}", get(conflicts::get_one::<A>))
    .route("/conflicts/{id}/resolve", post(conflicts::resolve::<A>))
    // Recommendations
    .route("/recommendations/{id}", get(recommendations::get_one::<A>))
    .route("/recommendations/{id}/accept", post(recommendations::accept::<A>))
    .route("/recommendations/{id}/reject", post(recommendations::reject::<A>))
    .route("/recommendations/{id}/implement", post(recommendations::implement::<A>))
    .route("/recommendations/{id}/modify", post(recommendations::modify::<A>))
    // Simulations
    .route("/simulations", get(simulations::list::<A>).post(simulations::submit::<A>))
    .route("/simulations/{id}", get(simulations::get_one::<A>))
    .route("/simulations/{id}/cancel", post(simulations::cancel::<A>))
    .route("/scenarios", get(simulations::scenarios::<A>))
    // Audit
    .route("/audit", get(audit::query::<A>))
    .route("/stats", get(audit::stats::<A>))
    .with_state(dispatcher)
}
