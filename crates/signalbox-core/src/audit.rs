//! Audit entries and the `AuditSink` trait.
//!
//! The engine emits one entry per decision transition and per settled
//! simulation run. Entries are immutable once appended; sinks never update or
//! delete them.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{network::TrainId, recommendation::DecisionAction, simulation::RunStatus};

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
  Accept,
  Reject,
  Modify,
  Implement,
  OverrideResolve,
  SimulationCompleted,
  SimulationFailed,
  SimulationCancelled,
}

impl AuditAction {
  /// The discriminant stored by persistent sinks. Must match the serde
  /// `snake_case` tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Accept => "accept",
      Self::Reject => "reject",
      Self::Modify => "modify",
      Self::Implement => "implement",
      Self::OverrideResolve => "override_resolve",
      Self::SimulationCompleted => "simulation_completed",
      Self::SimulationFailed => "simulation_failed",
      Self::SimulationCancelled => "simulation_cancelled",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    [
      Self::Accept,
      Self::Reject,
      Self::Modify,
      Self::Implement,
      Self::OverrideResolve,
      Self::SimulationCompleted,
      Self::SimulationFailed,
      Self::SimulationCancelled,
    ]
    .into_iter()
    .find(|a| a.as_str() == s)
  }

  /// The action recorded when a run settles in `status`, if terminal.
  pub fn for_run(status: RunStatus) -> Option<Self> {
    match status {
      RunStatus::Completed => Some(Self::SimulationCompleted),
      RunStatus::Failed => Some(Self::SimulationFailed),
      RunStatus::Cancelled => Some(Self::SimulationCancelled),
      RunStatus::Queued | RunStatus::Running => None,
    }
  }
}

impl From<DecisionAction> for AuditAction {
  fn from(action: DecisionAction) -> Self {
    match action {
      DecisionAction::Accept => Self::Accept,
      DecisionAction::Reject => Self::Reject,
      DecisionAction::Modify => Self::Modify,
      DecisionAction::Implement => Self::Implement,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Success,
  Partial,
  Failure,
}

impl Outcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Partial => "partial",
      Self::Failure => "failure",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "success" => Some(Self::Success),
      "partial" => Some(Self::Partial),
      "failure" => Some(Self::Failure),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id:         Uuid,
  pub timestamp:  DateTime<Utc>,
  pub actor:      String,
  pub action:     AuditAction,
  /// The recommendation, conflict or run the action applied to.
  pub subject:    String,
  pub trains:     Vec<TrainId>,
  pub outcome:    Outcome,
  /// Whether the actor departed from the engine's top suggestion.
  pub overridden: bool,
  pub impact:     String,
}

impl AuditEntry {
  /// A successful, non-overriding entry stamped now. Adjust the remaining
  /// fields with struct update syntax.
  pub fn new(actor: &str, action: AuditAction, subject: &str) -> Self {
    Self {
      id: Uuid::new_v4(),
      timestamp: Utc::now(),
      actor: actor.to_owned(),
      action,
      subject: subject.to_owned(),
      trains: Vec::new(),
      outcome: Outcome::Success,
      overridden: false,
      impact: String::new(),
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for [`AuditSink::query`]. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
  pub actor:      Option<String>,
  pub action:     Option<AuditAction>,
  pub train:      Option<TrainId>,
  pub overridden: Option<bool>,
  /// Case-insensitive match over actor, subject, impact note and trains.
  pub text:       Option<String>,
  pub after:      Option<DateTime<Utc>>,
  pub before:     Option<DateTime<Utc>>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

impl AuditQuery {
  /// Whether `entry` passes every filter (paging aside).
  pub fn matches(&self, entry: &AuditEntry) -> bool {
    if self.actor.as_ref().is_some_and(|a| *a != entry.actor) {
      return false;
    }
    if self.action.is_some_and(|a| a != entry.action) {
      return false;
    }
    if self.train.as_ref().is_some_and(|t| !entry.trains.contains(t)) {
      return false;
    }
    if self.overridden.is_some_and(|o| o != entry.overridden) {
      return false;
    }
    if self.after.is_some_and(|t| entry.timestamp < t) {
      return false;
    }
    if self.before.is_some_and(|t| entry.timestamp > t) {
      return false;
    }
    if let Some(text) = &self.text {
      let needle = text.to_lowercase();
      let hit = entry.actor.to_lowercase().contains(&needle)
        || entry.subject.to_lowercase().contains(&needle)
        || entry.impact.to_lowercase().contains(&needle)
        || entry.trains.iter().any(|t| t.to_lowercase().contains(&needle));
      if !hit {
        return false;
      }
    }
    true
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Append-only destination for audit entries.
///
/// All methods return `Send` futures so sinks can be shared across tasks in
/// a multi-threaded runtime.
pub trait AuditSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist `entry`. Never fails for a well-formed entry under normal
  /// operation.
  fn append(
    &self,
    entry: AuditEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Entries matching `query`, newest first.
  fn query<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + 'a;
}
