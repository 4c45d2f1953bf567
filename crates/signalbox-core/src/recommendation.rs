//! Recommendations, their remedies, and the status state machine.
//!
//! Status only ever moves forward:
//!
//! ```text
//! pending ──accept──▶ approved ──implement──▶ implemented
//!    │ ▲
//!    │ └──modify (parameters replaced, version bumped)
//!    └────reject──▶ rejected
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  conflict::Conflict,
  network::{SectionId, TrainId},
};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
  Pending,
  Approved,
  Rejected,
  Implemented,
}

impl RecommendationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
      Self::Implemented => "implemented",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Rejected | Self::Implemented)
  }

  /// The status reached by applying `action`, or `None` if the transition is
  /// not allowed from here.
  pub fn apply(self, action: DecisionAction) -> Option<Self> {
    match (self, action) {
      (Self::Pending, DecisionAction::Accept) => Some(Self::Approved),
      (Self::Pending, DecisionAction::Reject) => Some(Self::Rejected),
      (Self::Pending, DecisionAction::Modify) => Some(Self::Pending),
      (Self::Approved, DecisionAction::Implement) => Some(Self::Implemented),
      _ => None,
    }
  }
}

impl fmt::Display for RecommendationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An operator action on a single recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
  Accept,
  Reject,
  Modify,
  Implement,
}

impl DecisionAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Accept => "accept",
      Self::Reject => "reject",
      Self::Modify => "modify",
      Self::Implement => "implement",
    }
  }
}

// ─── Remedy ──────────────────────────────────────────────────────────────────

/// The concrete action a recommendation proposes. Operators may replace it
/// through `modify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Remedy {
  /// Let `favoured` go first; the `held` trains wait at their signals.
  Precedence {
    favoured: TrainId,
    held:     Vec<TrainId>,
  },
  /// Send `train` to another platform.
  Reroute {
    train: TrainId,
    via:   SectionId,
  },
  /// Re-sequence the signals protecting `section`.
  SignalRetiming { section: SectionId },
  /// Hold `train` for a fixed number of minutes.
  Hold { train: TrainId, minutes: u32 },
  /// Free-text operator remedy.
  Manual { note: String },
}

impl Remedy {
  /// Stable slug used in recommendation ids.
  pub fn slug(&self) -> &'static str {
    match self {
      Self::Precedence { .. } => "precedence",
      Self::Reroute { .. } => "reroute",
      Self::SignalRetiming { .. } => "signal-retiming",
      Self::Hold { .. } => "hold",
      Self::Manual { .. } => "manual",
    }
  }

  /// Trains named by the remedy.
  pub fn trains(&self) -> Vec<&str> {
    match self {
      Self::Precedence { favoured, held } => std::iter::once(favoured.as_str())
        .chain(held.iter().map(String::as_str))
        .collect(),
      Self::Reroute { train, .. } | Self::Hold { train, .. } => vec![train.as_str()],
      Self::SignalRetiming { .. } | Self::Manual { .. } => Vec::new(),
    }
  }

  pub fn title(&self) -> String {
    match self {
      Self::Precedence { favoured, .. } => format!("Grant precedence to {favoured}"),
      Self::Reroute { train, via } => format!("Reroute {train} via {via}"),
      Self::SignalRetiming { section } => {
        format!("Optimise signal timing at {section}")
      }
      Self::Hold { train, minutes } => format!("Hold {train} for {minutes} min"),
      Self::Manual { .. } => "Manual remedy".to_owned(),
    }
  }

  /// Check that an operator-supplied remedy makes sense for `conflict`.
  pub fn validate_for(&self, conflict: &Conflict) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidRemedy(msg));
    for train in self.trains() {
      if !conflict.involves(train) {
        return invalid(format!("{train} is not part of {}", conflict.id));
      }
    }
    match self {
      Self::Precedence { favoured, held } => {
        if held.is_empty() {
          return invalid("precedence must hold at least one train".to_owned());
        }
        if held.contains(favoured) {
          return invalid(format!("{favoured} cannot be both favoured and held"));
        }
      }
      Self::Reroute { via, .. } if via.is_empty() || *via == conflict.location => {
        return invalid(format!("cannot reroute via {:?}", via));
      }
      Self::SignalRetiming { section } if *section != conflict.location => {
        return invalid(format!("{section} is not where {} occurs", conflict.id));
      }
      Self::Hold { minutes: 0, .. } => {
        return invalid("hold must last at least one minute".to_owned());
      }
      Self::Manual { note } if note.trim().is_empty() => {
        return invalid("manual remedy needs a note".to_owned());
      }
      _ => {}
    }
    Ok(())
  }

  pub fn describe(&self, conflict: &Conflict) -> String {
    match self {
      Self::Precedence { favoured, held } => format!(
        "{} wait{} {} min at {} so {favoured} can clear first",
        held.join(", "),
        if held.len() == 1 { "s" } else { "" },
        conflict.overlap_minutes,
        conflict.location,
      ),
      Self::Reroute { train, via } => format!(
        "Move {train} from {} to {via} to avoid platform contention",
        conflict.location
      ),
      Self::SignalRetiming { section } => format!(
        "Adjust the signal sequence at {section} to shorten the {} min overlap",
        conflict.overlap_minutes
      ),
      Self::Hold { train, minutes } => format!(
        "Hold {train} for {minutes} min before it enters {}",
        conflict.location
      ),
      Self::Manual { note } => note.clone(),
    }
  }
}

// ─── Recommendation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
  /// Aggregate delay avoided compared with doing nothing.
  pub delay_saved_minutes: u32,
  /// Delay minutes weighted by service class; lower is better.
  pub passenger_impact:    u32,
  pub summary:             String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub id:                String,
  pub conflict_id:       String,
  pub remedy:            Remedy,
  pub title:             String,
  pub description:       String,
  pub impact:            Impact,
  /// 0–100.
  pub confidence:        u8,
  /// Minutes until the conflicting event.
  pub timeframe_minutes: u32,
  /// 1 for the top suggestion.
  pub rank:              u32,
  pub is_top:            bool,
  /// Set once an operator replaced the generated remedy.
  pub manual:            bool,
  pub status:            RecommendationStatus,
  pub created_at:        DateTime<Utc>,
  pub modified_at:       DateTime<Utc>,
  /// Bumped on every successful transition.
  pub version:           u64,
}

impl Recommendation {
  pub fn make_id(conflict_id: &str, remedy: &Remedy) -> String {
    format!("REC-{conflict_id}-{}", remedy.slug())
  }

  /// Whether acting on this recommendation departs from the engine's own
  /// top suggestion.
  pub fn diverges(&self) -> bool { !self.is_top || self.manual }
}
