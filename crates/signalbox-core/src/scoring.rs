//! The recommendation scorer.
//!
//! For each conflict the scorer proposes a small set of remedies, estimates
//! the delay each one saves against doing nothing, and folds three signals
//! into a confidence score:
//!
//! - **priority** — how strongly the remedy favours the higher-class train;
//! - **delay** — delay saved, saturating at `delay_saturation_minutes`;
//! - **history** — the remedy category's historical success rate.
//!
//! The weighted sum is normalised by the total weight and scaled to 0–100.

use std::{cmp::Ordering, collections::HashSet, fmt::Write as _};

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  config::ScoringConfig,
  conflict::{Conflict, ConflictKind},
  network::{NetworkSnapshot, PriorityClass, SectionKind},
  recommendation::{Impact, Recommendation, RecommendationStatus, Remedy},
};

/// A participant as the scorer sees it.
#[derive(Debug, Clone)]
struct Party<'a> {
  id:       &'a str,
  priority: PriorityClass,
  arrival:  DateTime<Utc>,
}

/// Delay (minutes) each train suffers under some course of action.
type DelayPlan<'a> = Vec<(&'a Party<'a>, f64)>;

#[derive(Debug, Clone)]
struct Candidate {
  remedy:           Remedy,
  score:            u8,
  delay_saved:      f64,
  passenger_impact: f64,
  /// Lexicographically first train the remedy delays or moves.
  train:            String,
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
  config: ScoringConfig,
}

impl Scorer {
  pub fn new(config: ScoringConfig) -> Self { Self { config } }

  pub fn config(&self) -> &ScoringConfig { &self.config }

  /// Propose and rank remedies for `conflict`.
  ///
  /// The returned list is ordered by rank; the first entry is the top
  /// suggestion and is never filtered out.
  pub fn score(
    &self,
    conflict: &Conflict,
    snapshot: &NetworkSnapshot,
  ) -> Result<Vec<Recommendation>> {
    let parties = parties(conflict, snapshot)?;
    let overlap = f64::from(conflict.overlap_minutes);

    let favoured = parties
      .iter()
      .min_by(|a, b| {
        (std::cmp::Reverse(a.priority.rank()), a.arrival, a.id)
          .cmp(&(std::cmp::Reverse(b.priority.rank()), b.arrival, b.id))
      })
      .ok_or_else(|| Error::InvalidConflict(format!("{} has no participants", conflict.id)))?;

    // Doing nothing: the first train through is unaffected, everybody else
    // stops at the signal for the overlap plus a restart penalty.
    let nothing: DelayPlan<'_> = parties
      .iter()
      .skip(1)
      .map(|p| (p, overlap + self.config.unresolved_penalty_minutes))
      .collect();
    let nothing_total = total(&nothing);

    let mut candidates = Vec::new();

    // Precedence to the highest-class train.
    let held: Vec<&Party<'_>> = parties.iter().filter(|p| p.id != favoured.id).collect();
    let plan: DelayPlan<'_> = held.iter().map(|p| (*p, overlap)).collect();
    let lowest_held = held.iter().map(|p| p.priority.rank()).min().unwrap_or(0);
    candidates.push(self.candidate(
      Remedy::Precedence {
        favoured: favoured.id.to_owned(),
        held:     held.iter().map(|p| p.id.to_owned()).collect(),
      },
      priority_delta(favoured.priority.rank(), lowest_held),
      nothing_total,
      &plan,
    ));

    match conflict.kind {
      ConflictKind::Platform => {
        if let Some(via) = free_platform(conflict, snapshot) {
          // Move the lowest-class train, the later arrival on a tie.
          let moved = parties
            .iter()
            .min_by(|a, b| {
              (a.priority.rank(), std::cmp::Reverse(a.arrival), std::cmp::Reverse(a.id))
                .cmp(&(b.priority.rank(), std::cmp::Reverse(b.arrival), std::cmp::Reverse(b.id)))
            })
            .unwrap_or(favoured);
          let highest_other = parties
            .iter()
            .filter(|p| p.id != moved.id)
            .map(|p| p.priority.rank())
            .max()
            .unwrap_or(0);
          let plan: DelayPlan<'_> = vec![(moved, self.config.reroute_penalty_minutes)];
          candidates.push(self.candidate(
            Remedy::Reroute { train: moved.id.to_owned(), via },
            priority_delta(highest_other, moved.priority.rank()),
            nothing_total,
            &plan,
          ));
        }
      }
      ConflictKind::Crossing => {
        let plan: DelayPlan<'_> =
          parties.iter().skip(1).map(|p| (p, overlap / 2.0)).collect();
        candidates.push(self.candidate(
          Remedy::SignalRetiming { section: conflict.location.clone() },
          0.0,
          nothing_total,
          &plan,
        ));
      }
    }

    candidates.sort_by(by_rank);

    let min = self.config.min_confidence;
    Ok(
      candidates
        .into_iter()
        .enumerate()
        .filter(|(i, c)| *i == 0 || c.score >= min)
        .enumerate()
        .map(|(rank, (_, c))| self.recommendation(conflict, c, rank, snapshot.taken_at))
        .collect(),
    )
  }

  fn candidate(
    &self,
    remedy: Remedy,
    priority: f64,
    nothing_total: f64,
    plan: &DelayPlan<'_>,
  ) -> Candidate {
    let delay_saved = (nothing_total - total(plan)).max(0.0);
    let passenger_impact = plan
      .iter()
      .map(|(p, minutes)| minutes * f64::from(p.priority.passenger_weight()))
      .sum();
    let train = plan.iter().map(|(p, _)| p.id).min().unwrap_or_default().to_owned();
    Candidate {
      score: self.weigh(&remedy, priority, delay_saved),
      remedy,
      delay_saved,
      passenger_impact,
      train,
    }
  }

  fn weigh(&self, remedy: &Remedy, priority: f64, delay_saved: f64) -> u8 {
    let c = &self.config;
    let weights = [c.priority_weight, c.delay_weight, c.history_weight].map(|w| w.max(0.0));
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
      return 0;
    }
    let delay = if c.delay_saturation_minutes > 0.0 {
      (delay_saved / c.delay_saturation_minutes).clamp(0.0, 1.0)
    } else {
      1.0
    };
    let signals = [
      priority.clamp(0.0, 1.0),
      delay,
      c.history.for_remedy(remedy),
    ];
    let weighted: f64 = weights.iter().zip(signals).map(|(w, s)| w * s).sum();
    let score = (100.0 * weighted / sum).round();
    if score.is_finite() { score.clamp(0.0, 100.0) as u8 } else { 0 }
  }

  fn recommendation(
    &self,
    conflict: &Conflict,
    candidate: Candidate,
    rank: usize,
    now: DateTime<Utc>,
  ) -> Recommendation {
    let delay_saved_minutes = candidate.delay_saved.round() as u32;
    let passenger_impact = candidate.passenger_impact.round() as u32;
    let mut summary = format!("Save {delay_saved_minutes} min overall delay");
    if let Remedy::Reroute { .. } = candidate.remedy {
      let _ = write!(summary, ", clears {}", conflict.location);
    }
    let rank = u32::try_from(rank).unwrap_or(u32::MAX).saturating_add(1);
    Recommendation {
      id: Recommendation::make_id(&conflict.id, &candidate.remedy),
      conflict_id: conflict.id.clone(),
      title: candidate.remedy.title(),
      description: candidate.remedy.describe(conflict),
      impact: Impact { delay_saved_minutes, passenger_impact, summary },
      confidence: candidate.score,
      timeframe_minutes: conflict.minutes_until(),
      rank,
      is_top: rank == 1,
      manual: false,
      status: RecommendationStatus::Pending,
      created_at: now,
      modified_at: now,
      version: 1,
      remedy: candidate.remedy,
    }
  }
}

/// Look up every participant, ordered by arrival at the contested section.
/// Highest score first, then lower passenger impact, then train id.
fn by_rank(a: &Candidate, b: &Candidate) -> Ordering {
  b.score
    .cmp(&a.score)
    .then(a.passenger_impact.total_cmp(&b.passenger_impact))
    .then_with(|| a.train.cmp(&b.train))
    .then_with(|| a.remedy.slug().cmp(b.remedy.slug()))
}

fn parties<'a>(conflict: &Conflict, snapshot: &'a NetworkSnapshot) -> Result<Vec<Party<'a>>> {
  if conflict.participants.len() < 2 {
    return Err(Error::InvalidConflict(format!(
      "{} has {} participant(s), need at least two",
      conflict.id,
      conflict.participants.len()
    )));
  }

  let mut seen = HashSet::new();
  let occupants = snapshot.section(&conflict.location).map(|s| &s.occupants);
  let mut parties = Vec::with_capacity(conflict.participants.len());
  for id in &conflict.participants {
    if !seen.insert(id.as_str()) {
      return Err(Error::InvalidConflict(format!(
        "{} lists {id} twice",
        conflict.id
      )));
    }
    let movement = snapshot.movement(id).ok_or_else(|| {
      Error::InvalidConflict(format!("{} refers to unknown train {id}", conflict.id))
    })?;
    let arrival = if occupants.is_some_and(|o| o.contains(id)) {
      snapshot.taken_at
    } else {
      movement.estimated_arrival
    };
    parties.push(Party { id: &movement.id, priority: movement.priority, arrival });
  }

  parties.sort_by(|a, b| (a.arrival, a.id).cmp(&(b.arrival, b.id)));
  Ok(parties)
}

/// An empty platform no train is heading for, least utilised first.
fn free_platform(conflict: &Conflict, snapshot: &NetworkSnapshot) -> Option<String> {
  snapshot
    .sections
    .iter()
    .filter(|s| s.kind == SectionKind::Platform && s.id != conflict.location)
    .filter(|s| s.occupants.is_empty())
    .filter(|s| !snapshot.movements.iter().any(|m| m.next_waypoint == s.id))
    .min_by(|a, b| (a.capacity_percent, &a.id).cmp(&(b.capacity_percent, &b.id)))
    .map(|s| s.id.clone())
}

fn priority_delta(favoured: u8, disfavoured: u8) -> f64 {
  f64::from(favoured.saturating_sub(disfavoured)) / 3.0
}

fn total(plan: &DelayPlan<'_>) -> f64 { plan.iter().map(|(_, m)| m).sum() }
