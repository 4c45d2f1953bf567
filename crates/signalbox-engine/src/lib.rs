//! Stateful services of the Signalbox decision engine.
//!
//! [`Dispatcher`] wires the pieces together: a new snapshot lands in the
//! [`MovementStore`], the core detector and scorer run over it, and the
//! results are merged into the [`DecisionBoard`], where operators act on
//! recommendations. [`SimulationEngine`] runs what-if scenarios on background
//! tasks. Every decision and settled run is written to an
//! [`signalbox_core::audit::AuditSink`].

pub mod board;
pub mod demo;
pub mod dispatcher;
pub mod feed;
pub mod memory;
pub mod simulation;

pub use board::{ConflictView, DecisionBoard, DecisionStats, SyncSummary};
pub use dispatcher::{Dispatcher, RefreshSummary, SectionStatus, SectionSummary};
pub use feed::MovementStore;
pub use memory::MemoryAuditLog;
pub use simulation::SimulationEngine;

#[cfg(test)]
mod tests;
