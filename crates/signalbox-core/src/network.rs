//! Train movements and the section resource graph.
//!
//! A [`NetworkSnapshot`] is delivered whole by the upstream feed and is never
//! partially mutated; the engine swaps one snapshot for the next.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type TrainId = String;
pub type SectionId = String;

// ─── Movements ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
  OnTime,
  Delayed,
  Critical,
}

/// Service class of a train. Higher classes win precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
  Critical,
  High,
  Medium,
  Low,
}

impl PriorityClass {
  /// `3` for critical down to `0` for low.
  pub fn rank(self) -> u8 {
    match self {
      Self::Critical => 3,
      Self::High => 2,
      Self::Medium => 1,
      Self::Low => 0,
    }
  }

  /// Relative passenger exposure per minute of delay.
  pub fn passenger_weight(self) -> u32 { u32::from(self.rank()) + 1 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainMovement {
  pub id:                TrainId,
  pub route:             String,
  /// Linear offset along the route, in miles.
  pub position_miles:    f64,
  pub status:            TrainStatus,
  pub delay_minutes:     u32,
  pub priority:          PriorityClass,
  /// The section this train will claim next.
  pub next_waypoint:     SectionId,
  /// Projected arrival at `next_waypoint`, delay already included.
  pub estimated_arrival: DateTime<Utc>,
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
  Junction,
  Platform,
  Corridor,
}

fn default_clearance() -> u32 { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSection {
  pub id:                SectionId,
  #[serde(default)]
  pub name:              String,
  pub kind:              SectionKind,
  /// Current utilisation, 0–100.
  pub capacity_percent:  u8,
  #[serde(default)]
  pub occupants:         BTreeSet<TrainId>,
  /// How long one train holds the section.
  #[serde(default = "default_clearance")]
  pub clearance_minutes: u32,
}

/// An ordering already agreed between two trains on one section. Claims
/// covered by a precedence never conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precedence {
  pub section:  SectionId,
  pub leader:   TrainId,
  pub follower: TrainId,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
  /// The instant the feed observed this state. Detection treats it as "now".
  pub taken_at:    DateTime<Utc>,
  #[serde(default)]
  pub movements:   Vec<TrainMovement>,
  #[serde(default)]
  pub sections:    Vec<ResourceSection>,
  #[serde(default)]
  pub precedences: Vec<Precedence>,
}

impl NetworkSnapshot {
  pub fn empty(taken_at: DateTime<Utc>) -> Self {
    Self {
      taken_at,
      movements: Vec::new(),
      sections: Vec::new(),
      precedences: Vec::new(),
    }
  }

  pub fn movement(&self, id: &str) -> Option<&TrainMovement> {
    self.movements.iter().find(|m| m.id == id)
  }

  pub fn section(&self, id: &str) -> Option<&ResourceSection> {
    self.sections.iter().find(|s| s.id == id)
  }

  /// Whether an ordering exists between `a` and `b` on `section`, in either
  /// direction.
  pub fn has_precedence(&self, section: &str, a: &str, b: &str) -> bool {
    self.precedences.iter().any(|p| {
      p.section == section
        && ((p.leader == a && p.follower == b)
          || (p.leader == b && p.follower == a))
    })
  }

  /// Reject snapshots the detector cannot interpret consistently.
  pub fn validate(&self) -> Result<()> {
    let mut trains = HashSet::new();
    for m in &self.movements {
      if !trains.insert(m.id.as_str()) {
        return Err(Error::InvalidSnapshot(format!(
          "duplicate train id {}",
          m.id
        )));
      }
      if !m.position_miles.is_finite() || m.position_miles < 0.0 {
        return Err(Error::InvalidSnapshot(format!(
          "train {} has invalid position {}",
          m.id, m.position_miles
        )));
      }
    }

    let mut sections = HashSet::new();
    for s in &self.sections {
      if !sections.insert(s.id.as_str()) {
        return Err(Error::InvalidSnapshot(format!(
          "duplicate section id {}",
          s.id
        )));
      }
      if s.capacity_percent > 100 {
        return Err(Error::InvalidSnapshot(format!(
          "section {} reports {}% utilisation",
          s.id, s.capacity_percent
        )));
      }
      if s.clearance_minutes == 0 {
        return Err(Error::InvalidSnapshot(format!(
          "section {} has zero clearance time",
          s.id
        )));
      }
      if let Some(unknown) = s.occupants.iter().find(|t| !trains.contains(t.as_str())) {
        return Err(Error::InvalidSnapshot(format!(
          "section {} is occupied by unknown train {unknown}",
          s.id
        )));
      }
    }

    if let Some(m) = self
      .movements
      .iter()
      .find(|m| !sections.contains(m.next_waypoint.as_str()))
    {
      return Err(Error::InvalidSnapshot(format!(
        "train {} heads for unknown section {}",
        m.id, m.next_waypoint
      )));
    }

    if let Some(p) = self
      .precedences
      .iter()
      .find(|p| !sections.contains(p.section.as_str()))
    {
      return Err(Error::InvalidSnapshot(format!(
        "precedence refers to unknown section {}",
        p.section
      )));
    }

    Ok(())
  }
}
