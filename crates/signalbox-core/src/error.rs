//! Error types for `signalbox-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::recommendation::RecommendationStatus;

#[derive(Debug, Error)]
pub enum Error {
  /// The detector handed the scorer something it cannot reason about.
  #[error("invalid conflict: {0}")]
  InvalidConflict(String),

  #[error("invalid snapshot: {0}")]
  InvalidSnapshot(String),

  #[error("invalid remedy: {0}")]
  InvalidRemedy(String),

  /// Optimistic-concurrency collision: somebody else moved the record on.
  #[error("recommendation {id} is at version {actual}, not {expected}")]
  StaleVersion {
    id:       String,
    expected: u64,
    actual:   u64,
  },

  #[error("cannot {action} recommendation {id} while it is {from}")]
  InvalidTransition {
    id:     String,
    from:   RecommendationStatus,
    action: &'static str,
  },

  #[error("conflict {0} is already resolved")]
  AlreadyResolved(String),

  #[error("scenario {0} already has a run in progress")]
  AlreadyRunning(String),

  #[error("conflict not found: {0}")]
  ConflictNotFound(String),

  #[error("recommendation not found: {0}")]
  RecommendationNotFound(String),

  #[error("simulation run not found: {0}")]
  RunNotFound(Uuid),

  #[error("simulation failed: {0}")]
  SimulationFailure(String),

  #[error("audit sink error: {0}")]
  Audit(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::ConflictNotFound(_)
        | Self::RecommendationNotFound(_)
        | Self::RunNotFound(_)
    )
  }

  /// Errors a caller can fix by re-reading state and retrying.
  pub fn is_conflict(&self) -> bool {
    matches!(
      self,
      Self::StaleVersion { .. }
        | Self::InvalidTransition { .. }
        | Self::AlreadyResolved(_)
        | Self::AlreadyRunning(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
