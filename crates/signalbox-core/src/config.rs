//! Tunable parameters for detection, scoring and simulation.
//!
//! Every struct is `#[serde(default)]`, so a partial TOML table (or none at
//! all) deserialises into a working configuration.

use serde::{Deserialize, Serialize};

use crate::recommendation::Remedy;

/// Top-level engine configuration, nested under `[engine]` in the server's
/// config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub detector:   DetectorConfig,
  pub scoring:    ScoringConfig,
  pub simulation: SimulationConfig,
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// Claims starting later than this many minutes after the snapshot are
  /// ignored.
  pub horizon_minutes:                u32,
  pub high_severity_within_minutes:   u32,
  pub medium_severity_within_minutes: u32,
  /// Sections at or above this utilisation raise conflict severity by one
  /// level and are reported as congested.
  pub congested_capacity_percent:     u8,
  /// Below this utilisation a section is reported as optimal.
  pub active_capacity_percent:        u8,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      horizon_minutes:                30,
      high_severity_within_minutes:   5,
      medium_severity_within_minutes: 15,
      congested_capacity_percent:     90,
      active_capacity_percent:        75,
    }
  }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Weights for the confidence score. The three weights need not sum to one;
/// the score is normalised by their total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  pub priority_weight:            f64,
  pub delay_weight:               f64,
  pub history_weight:             f64,
  pub history:                    HistoricalSuccess,
  /// Delay savings at or above this many minutes max out the delay term.
  pub delay_saturation_minutes:   f64,
  /// Extra stop-and-restart cost charged to every train that meets an
  /// unmanaged conflict.
  pub unresolved_penalty_minutes: f64,
  pub reroute_penalty_minutes:    f64,
  /// Alternatives below this confidence are dropped. The top suggestion is
  /// always kept.
  pub min_confidence:             u8,
  /// Conflicts whose top suggestion reaches this confidence are flagged as
  /// eligible for automatic implementation. Nothing is implemented
  /// automatically; the flag is advisory.
  pub auto_implement_threshold:   u8,
}

impl Default for ScoringConfig {
  fn default() -> Self {
    Self {
      priority_weight:            0.3,
      delay_weight:               0.4,
      history_weight:             0.3,
      history:                    HistoricalSuccess::default(),
      delay_saturation_minutes:   15.0,
      unresolved_penalty_minutes: 5.0,
      reroute_penalty_minutes:    2.0,
      min_confidence:             0,
      auto_implement_threshold:   95,
    }
  }
}

/// Historical success rate per remedy category, each in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalSuccess {
  pub precedence:      f64,
  pub reroute:         f64,
  pub signal_retiming: f64,
  pub hold:            f64,
  pub manual:          f64,
}

impl Default for HistoricalSuccess {
  fn default() -> Self {
    Self {
      precedence:      0.92,
      reroute:         0.85,
      signal_retiming: 0.76,
      hold:            0.70,
      manual:          0.50,
    }
  }
}

impl HistoricalSuccess {
  pub fn for_remedy(&self, remedy: &Remedy) -> f64 {
    let weight = match remedy {
      Remedy::Precedence { .. } => self.precedence,
      Remedy::Reroute { .. } => self.reroute,
      Remedy::SignalRetiming { .. } => self.signal_retiming,
      Remedy::Hold { .. } => self.hold,
      Remedy::Manual { .. } => self.manual,
    };
    weight.clamp(0.0, 1.0)
  }
}

// ─── Simulation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
  /// Number of progress checkpoints per run.
  pub steps:                      u32,
  pub step_interval_ms:           u64,
  pub max_concurrent_runs:        usize,
  /// Settled runs kept for status queries; older ones are forgotten.
  pub retained_runs:              usize,
  /// A disruption lasting this long (or longer) is applied at full weight.
  pub observation_window_minutes: f64,
  /// On-time percentage points lost per minute of added average delay.
  pub on_time_sensitivity:        f64,
  /// Throughput percentage points lost per minute of exposed delay factor.
  pub throughput_sensitivity:     f64,
  /// Extra conflicts projected per minute of added average delay.
  pub conflict_sensitivity:       f64,
  /// Actor recorded on audit entries for settled runs.
  pub actor:                      String,
}

impl Default for SimulationConfig {
  fn default() -> Self {
    Self {
      steps:                      20,
      step_interval_ms:           50,
      max_concurrent_runs:        4,
      retained_runs:              100,
      observation_window_minutes: 240.0,
      on_time_sensitivity:        2.5,
      throughput_sensitivity:     1.0,
      conflict_sensitivity:       0.5,
      actor:                      "system_sim".to_owned(),
    }
  }
}
