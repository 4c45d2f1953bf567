//! What-if scenarios, run records, and the deterministic projection.
//!
//! [`project`] is the whole model: it takes a scenario's baseline metrics,
//! weighs the disruption by how long it lasts and how much of the network it
//! touches, and clamps every output to its valid range. There is no hidden
//! randomness, so an unchanged scenario against an unchanged topology always
//! projects the same metrics.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  config::SimulationConfig,
  network::{ResourceSection, SectionId},
};

pub type ScenarioId = String;

// ─── Scenario ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisruptionKind {
  Weather,
  Technical,
  Incident,
  Optimization,
  #[default]
  Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisruptionParameters {
  #[serde(default)]
  pub kind:                 DisruptionKind,
  /// Extra minutes of delay imposed on affected traffic.
  pub delay_factor_minutes: f64,
  /// Empty means network-wide.
  #[serde(default)]
  pub affected_sections:    Vec<SectionId>,
  pub duration_minutes:     f64,
}

/// Deltas the scenario author declares up front, applied on top of the
/// modelled disruption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclaredImpact {
  pub throughput_percent: f64,
  pub delay_minutes:      f64,
  pub reroutes:           i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
  pub on_time_performance:   f64,
  pub average_delay_minutes: f64,
  pub throughput_percent:    f64,
  pub conflict_count:        u32,
  pub reroute_count:         u32,
}

impl NetworkMetrics {
  /// Figures from the current schedule on the operations dashboard.
  pub fn current_schedule() -> Self {
    Self {
      on_time_performance:   94.2,
      average_delay_minutes: 2.4,
      throughput_percent:    87.0,
      conflict_count:        3,
      reroute_count:         0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationScenario {
  pub id:          ScenarioId,
  pub name:        String,
  #[serde(default)]
  pub description: String,
  pub disruption:  DisruptionParameters,
  #[serde(default)]
  pub impact:      DeclaredImpact,
  #[serde(default = "NetworkMetrics::current_schedule")]
  pub baseline:    NetworkMetrics,
}

// ─── Run ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Queued,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl RunStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Queued => "queued",
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Cancelled => "cancelled",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
  pub id:           Uuid,
  pub scenario_id:  ScenarioId,
  pub status:       RunStatus,
  /// 0–100; never decreases.
  pub progress:     u8,
  pub queued_at:    DateTime<Utc>,
  pub started_at:   Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub result:       Option<NetworkMetrics>,
  pub error:        Option<String>,
}

impl SimulationRun {
  pub fn queued(scenario_id: ScenarioId) -> Self {
    Self {
      id: Uuid::new_v4(),
      scenario_id,
      status: RunStatus::Queued,
      progress: 0,
      queued_at: Utc::now(),
      started_at: None,
      completed_at: None,
      result: None,
      error: None,
    }
  }
}

// ─── Projection ──────────────────────────────────────────────────────────────

/// Reject parameters the model cannot interpret.
pub fn validate(scenario: &SimulationScenario) -> Result<()> {
  let d = &scenario.disruption;
  let i = &scenario.impact;
  let b = &scenario.baseline;
  let finite = [
    ("delay factor", d.delay_factor_minutes),
    ("duration", d.duration_minutes),
    ("declared throughput delta", i.throughput_percent),
    ("declared delay delta", i.delay_minutes),
    ("baseline on-time performance", b.on_time_performance),
    ("baseline average delay", b.average_delay_minutes),
    ("baseline throughput", b.throughput_percent),
  ];
  if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
    return Err(Error::SimulationFailure(format!("{name} is not a number: {value}")));
  }
  if d.delay_factor_minutes < 0.0 {
    return Err(Error::SimulationFailure(format!(
      "delay factor must be non-negative, got {}",
      d.delay_factor_minutes
    )));
  }
  if d.duration_minutes < 0.0 {
    return Err(Error::SimulationFailure(format!(
      "duration must be non-negative, got {}",
      d.duration_minutes
    )));
  }
  Ok(())
}

/// Share of the network a disruption touches, in `[0, 1]`.
///
/// An empty list, or an empty topology, means the whole network. Every
/// listed section must exist in a non-empty topology.
pub fn affected_share(affected: &[SectionId], sections: &[ResourceSection]) -> Result<f64> {
  if affected.is_empty() || sections.is_empty() {
    return Ok(1.0);
  }
  let known: HashSet<&str> = sections.iter().map(|s| s.id.as_str()).collect();
  let (hit, unknown): (BTreeSet<&str>, BTreeSet<&str>) =
    affected.iter().map(String::as_str).partition(|id| known.contains(id));
  if !unknown.is_empty() {
    let names: Vec<&str> = unknown.into_iter().collect();
    return Err(Error::SimulationFailure(format!(
      "unknown affected sections: {}",
      names.join(", ")
    )));
  }
  Ok(hit.len() as f64 / sections.len() as f64)
}

/// Metrics after `fraction` (0–1) of the disruption has played out.
/// `fraction = 1.0` is the run's final result.
pub fn project(
  scenario: &SimulationScenario,
  sections: &[ResourceSection],
  config: &SimulationConfig,
  fraction: f64,
) -> Result<NetworkMetrics> {
  validate(scenario)?;
  let fraction = fraction.clamp(0.0, 1.0);
  let d = &scenario.disruption;
  let i = &scenario.impact;
  let b = &scenario.baseline;

  let window = if config.observation_window_minutes > 0.0 {
    (d.duration_minutes / config.observation_window_minutes).min(1.0)
  } else {
    1.0
  };
  let exposure = window * affected_share(&d.affected_sections, sections)? * fraction;

  let exposed_factor = d.delay_factor_minutes * exposure;
  let added_delay = exposed_factor + i.delay_minutes * fraction;

  let metrics = NetworkMetrics {
    on_time_performance:   (b.on_time_performance - config.on_time_sensitivity * added_delay)
      .clamp(0.0, 100.0),
    average_delay_minutes: (b.average_delay_minutes + added_delay).max(0.0),
    throughput_percent:    (b.throughput_percent + i.throughput_percent * fraction
      - config.throughput_sensitivity * exposed_factor)
      .clamp(0.0, 100.0),
    conflict_count:        add_count(
      b.conflict_count,
      (config.conflict_sensitivity * added_delay.max(0.0)).round() as i64,
    ),
    reroute_count:         add_count(b.reroute_count, (i.reroutes as f64 * fraction).round() as i64),
  };

  if [
    metrics.on_time_performance,
    metrics.average_delay_minutes,
    metrics.throughput_percent,
  ]
  .iter()
  .any(|v| !v.is_finite())
  {
    return Err(Error::SimulationFailure("projection diverged".to_owned()));
  }
  Ok(metrics)
}

fn add_count(base: u32, delta: i64) -> u32 {
  (i64::from(base) + delta).clamp(0, i64::from(u32::MAX)) as u32
}

// ─── Catalogue ───────────────────────────────────────────────────────────────

/// The predefined scenarios offered to operators, projected against
/// `baseline`.
pub fn catalogue(baseline: &NetworkMetrics) -> Vec<SimulationScenario> {
  let scenario = |id: &str,
                  name: &str,
                  description: &str,
                  kind: DisruptionKind,
                  delay: f64,
                  duration: f64,
                  sections: &[&str],
                  impact: DeclaredImpact| SimulationScenario {
    id: id.to_owned(),
    name: name.to_owned(),
    description: description.to_owned(),
    disruption: DisruptionParameters {
      kind,
      delay_factor_minutes: delay,
      affected_sections: sections.iter().map(|s| (*s).to_owned()).collect(),
      duration_minutes: duration,
    },
    impact,
    baseline: baseline.clone(),
  };

  vec![
    scenario(
      "PLATFORM_CLOSURE",
      "Platform Closure Simulation",
      "Platform 3 unavailable for 2 hours",
      DisruptionKind::Incident,
      5.0,
      120.0,
      &["PLAT-3"],
      DeclaredImpact { throughput_percent: -15.0, delay_minutes: 8.0, reroutes: 12 },
    ),
    scenario(
      "WEATHER_001",
      "Heavy Rain - 30% Speed Reduction",
      "Reduced visibility and speed restrictions across the network",
      DisruptionKind::Weather,
      12.0,
      180.0,
      &[],
      DeclaredImpact { throughput_percent: -25.0, delay_minutes: 12.0, reroutes: 8 },
    ),
    scenario(
      "PEAK_OPTIMIZATION",
      "Peak Hour Optimization",
      "Increased train frequency (25% more)",
      DisruptionKind::Optimization,
      0.0,
      120.0,
      &[],
      DeclaredImpact { throughput_percent: 18.0, delay_minutes: 3.0, reroutes: 15 },
    ),
    scenario(
      "SIGNAL_001",
      "Signal Failure - Junction B",
      "Major junction signal failure requiring rerouting",
      DisruptionKind::Technical,
      10.0,
      90.0,
      &["JCT-B"],
      DeclaredImpact { throughput_percent: -10.0, delay_minutes: 0.0, reroutes: 8 },
    ),
    scenario(
      "INCIDENT_001",
      "Passenger Emergency - Platform 3",
      "Medical emergency causing platform blockage",
      DisruptionKind::Incident,
      6.0,
      45.0,
      &["PLAT-3"],
      DeclaredImpact { throughput_percent: -5.0, delay_minutes: 0.0, reroutes: 5 },
    ),
  ]
}
