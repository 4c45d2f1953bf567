//! Conflict records and the detector that produces them.
//!
//! Detection is a pure function of a [`NetworkSnapshot`] and a
//! [`DetectorConfig`]. The snapshot's `taken_at` stands in for "now", so the
//! same input always yields the same conflicts with the same ids.

use std::{
  cmp::{Ordering, Reverse},
  collections::{BTreeMap, BTreeSet},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  config::DetectorConfig,
  network::{NetworkSnapshot, PriorityClass, SectionId, SectionKind, TrainId, TrainStatus},
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
  Crossing,
  Platform,
}

impl From<SectionKind> for ConflictKind {
  fn from(kind: SectionKind) -> Self {
    match kind {
      SectionKind::Platform => Self::Platform,
      SectionKind::Junction | SectionKind::Corridor => Self::Crossing,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  High,
  Medium,
  Low,
}

impl Severity {
  pub fn rank(self) -> u8 {
    match self {
      Self::High => 2,
      Self::Medium => 1,
      Self::Low => 0,
    }
  }

  /// One level more urgent, saturating at `High`.
  pub fn escalate(self) -> Self {
    match self {
      Self::Low => Self::Medium,
      Self::Medium | Self::High => Self::High,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
  pub id:              String,
  pub kind:            ConflictKind,
  /// Sorted, at least two.
  pub participants:    Vec<TrainId>,
  pub location:        SectionId,
  pub detected_at:     DateTime<Utc>,
  /// When the first overlapping claim begins; never before `detected_at`.
  pub eta:             DateTime<Utc>,
  /// Longest pairwise overlap between claims, rounded up.
  pub overlap_minutes: u32,
  pub severity:        Severity,
  pub resolved:        bool,
}

impl Conflict {
  pub fn make_id(location: &str, participants: &[TrainId]) -> String {
    format!("CONF-{location}-{}", participants.join("+"))
  }

  /// Whole minutes from detection to the conflicting event.
  pub fn minutes_until(&self) -> u32 {
    u32::try_from((self.eta - self.detected_at).num_minutes()).unwrap_or(0)
  }

  pub fn involves(&self, train: &str) -> bool {
    self.participants.iter().any(|p| p == train)
  }
}

/// Ascending eta, then most severe first, then id.
pub fn conflict_order(a: &Conflict, b: &Conflict) -> Ordering {
  (a.eta, Reverse(a.severity.rank()), &a.id).cmp(&(b.eta, Reverse(b.severity.rank()), &b.id))
}

pub fn sort_conflicts(conflicts: &mut [Conflict]) { conflicts.sort_by(conflict_order); }

// ─── Detection ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Claim<'a> {
  train: &'a str,
  start: DateTime<Utc>,
  end:   DateTime<Utc>,
}

/// Scan every section for overlapping claims within the lookahead horizon.
pub fn detect(snapshot: &NetworkSnapshot, config: &DetectorConfig) -> Vec<Conflict> {
  let now = snapshot.taken_at;
  let horizon_end = now + Duration::minutes(i64::from(config.horizon_minutes));

  // section → train → claim. A train both in and heading for a section keeps
  // its earlier claim.
  let mut claims: BTreeMap<&str, BTreeMap<&str, Claim<'_>>> = BTreeMap::new();

  for section in &snapshot.sections {
    let clearance = Duration::minutes(i64::from(section.clearance_minutes));
    for occupant in &section.occupants {
      keep_earliest(
        claims.entry(section.id.as_str()).or_default(),
        Claim { train: occupant, start: now, end: now + clearance },
      );
    }
  }

  for movement in &snapshot.movements {
    let Some(section) = snapshot.section(&movement.next_waypoint) else {
      continue;
    };
    let clearance = Duration::minutes(i64::from(section.clearance_minutes));
    let start = movement.estimated_arrival;
    let end = start + clearance;
    if end <= now || start > horizon_end {
      continue;
    }
    keep_earliest(
      claims.entry(section.id.as_str()).or_default(),
      Claim { train: &movement.id, start, end },
    );
  }

  let mut conflicts = Vec::new();
  for (section_id, by_train) in &claims {
    let Some(section) = snapshot.section(section_id) else {
      continue;
    };
    let list: Vec<Claim<'_>> = by_train.values().copied().collect();
    conflicts.extend(conflicts_on_section(snapshot, section_id, section.kind, &list, config));
  }

  // Congested sections raise severity one level.
  for conflict in &mut conflicts {
    if snapshot
      .section(&conflict.location)
      .is_some_and(|s| s.capacity_percent >= config.congested_capacity_percent)
    {
      conflict.severity = conflict.severity.escalate();
    }
  }

  sort_conflicts(&mut conflicts);
  conflicts
}

fn keep_earliest<'a>(slot: &mut BTreeMap<&'a str, Claim<'a>>, claim: Claim<'a>) {
  slot
    .entry(claim.train)
    .and_modify(|existing| {
      if claim.start < existing.start {
        *existing = claim;
      }
    })
    .or_insert(claim);
}

fn conflicts_on_section(
  snapshot: &NetworkSnapshot,
  section: &str,
  kind: SectionKind,
  claims: &[Claim<'_>],
  config: &DetectorConfig,
) -> Vec<Conflict> {
  let now = snapshot.taken_at;

  // Union-find over claim indices; an edge is an overlapping pair with no
  // established precedence.
  let mut parent: Vec<usize> = (0..claims.len()).collect();
  let mut edges = Vec::new();
  for i in 0..claims.len() {
    for j in (i + 1)..claims.len() {
      let (a, b) = (claims[i], claims[j]);
      let start = a.start.max(b.start);
      let end = a.end.min(b.end);
      if end <= start || snapshot.has_precedence(section, a.train, b.train) {
        continue;
      }
      edges.push((i, j, start.max(now), end - start));
      let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
      if ri != rj {
        parent[rj.max(ri)] = ri.min(rj);
      }
    }
  }

  let mut clusters: BTreeMap<usize, (BTreeSet<&str>, DateTime<Utc>, Duration)> =
    BTreeMap::new();
  for (i, j, eta, overlap) in edges {
    let root = find(&mut parent, i);
    let cluster = clusters
      .entry(root)
      .or_insert_with(|| (BTreeSet::new(), eta, overlap));
    cluster.0.insert(claims[i].train);
    cluster.0.insert(claims[j].train);
    cluster.1 = cluster.1.min(eta);
    cluster.2 = cluster.2.max(overlap);
  }

  clusters
    .into_values()
    .filter(|(trains, ..)| trains.len() >= 2)
    .map(|(trains, eta, overlap)| {
      let participants: Vec<TrainId> = trains.into_iter().map(str::to_owned).collect();
      let overlap_minutes = u32::try_from((overlap.num_seconds() + 59) / 60)
        .unwrap_or(u32::MAX)
        .max(1);
      Conflict {
        id: Conflict::make_id(section, &participants),
        kind: kind.into(),
        severity: classify(snapshot, &participants, eta, config),
        participants,
        location: section.to_owned(),
        detected_at: now,
        eta,
        overlap_minutes,
        resolved: false,
      }
    })
    .collect()
}

fn find(parent: &mut [usize], i: usize) -> usize {
  let mut root = i;
  while parent[root] != root {
    root = parent[root];
  }
  let mut cur = i;
  while parent[cur] != root {
    let next = parent[cur];
    parent[cur] = root;
    cur = next;
  }
  root
}

fn classify(
  snapshot: &NetworkSnapshot,
  participants: &[TrainId],
  eta: DateTime<Utc>,
  config: &DetectorConfig,
) -> Severity {
  let minutes = (eta - snapshot.taken_at).num_minutes();
  let movements: Vec<_> = participants
    .iter()
    .filter_map(|id| snapshot.movement(id))
    .collect();

  let critical = movements.iter().any(|m| {
    m.priority == PriorityClass::Critical || m.status == TrainStatus::Critical
  });
  if critical || minutes <= i64::from(config.high_severity_within_minutes) {
    return Severity::High;
  }

  let high_priority = movements.iter().any(|m| m.priority == PriorityClass::High);
  if high_priority || minutes <= i64::from(config.medium_severity_within_minutes) {
    return Severity::Medium;
  }

  Severity::Low
}
