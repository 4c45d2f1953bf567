//! The facade the API talks to.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalbox_core::{
  Result,
  audit::AuditSink,
  config::EngineConfig,
  conflict::detect,
  network::{NetworkSnapshot, SectionId, SectionKind},
  scoring::Scorer,
  simulation::{NetworkMetrics, SimulationScenario, catalogue},
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  board::{DecisionBoard, SyncSummary},
  feed::MovementStore,
  simulation::SimulationEngine,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSummary {
  pub taken_at: DateTime<Utc>,
  pub detected: usize,
  /// Conflicts the scorer could not handle. They are logged and left off the
  /// board.
  pub skipped:  usize,
  #[serde(flatten)]
  pub board:    SyncSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
  Optimal,
  Active,
  Congested,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
  pub id:               SectionId,
  pub name:             String,
  pub kind:             SectionKind,
  pub capacity_percent: u8,
  /// Trains in the section or heading for it.
  pub trains:           usize,
  /// Unresolved conflicts located here.
  pub conflicts:        usize,
  pub status:           SectionStatus,
}

/// Feed → detector → scorer → board, plus simulations and the audit log.
pub struct Dispatcher<A> {
  config:      EngineConfig,
  scorer:      Scorer,
  feed:        MovementStore,
  board:       DecisionBoard<A>,
  simulations: SimulationEngine<A>,
  audit:       Arc<A>,
  /// Serialises refreshes so detections are merged in snapshot order.
  refresh:     Mutex<()>,
}

impl<A: AuditSink + 'static> Dispatcher<A> {
  pub fn new(config: EngineConfig, audit: Arc<A>) -> Self {
    Self {
      scorer: Scorer::new(config.scoring.clone()),
      feed: MovementStore::default(),
      board: DecisionBoard::new(audit.clone(), config.scoring.auto_implement_threshold),
      simulations: SimulationEngine::new(config.simulation.clone(), audit.clone()),
      audit,
      config,
      refresh: Mutex::new(()),
    }
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn board(&self) -> &DecisionBoard<A> { &self.board }

  pub fn simulations(&self) -> &SimulationEngine<A> { &self.simulations }

  pub fn audit(&self) -> &A { &self.audit }

  pub fn snapshot(&self) -> Arc<NetworkSnapshot> { self.feed.snapshot() }

  /// Replace the network snapshot and merge the resulting detections into
  /// the board. An invalid snapshot changes nothing.
  pub async fn ingest(&self, snapshot: NetworkSnapshot) -> Result<RefreshSummary> {
    let _guard = self.refresh.lock().await;
    let snapshot = self.feed.replace(snapshot)?;
    Ok(self.merge(&snapshot).await)
  }

  /// Re-run detection over the current snapshot.
  pub async fn refresh(&self) -> RefreshSummary {
    let _guard = self.refresh.lock().await;
    let snapshot = self.feed.snapshot();
    self.merge(&snapshot).await
  }

  async fn merge(&self, snapshot: &NetworkSnapshot) -> RefreshSummary {
    let conflicts = detect(snapshot, &self.config.detector);
    let detected = conflicts.len();
    let mut scored = Vec::with_capacity(detected);
    let mut skipped = 0;
    for conflict in conflicts {
      match self.scorer.score(&conflict, snapshot) {
        Ok(recommendations) => scored.push((conflict, recommendations)),
        Err(e) => {
          warn!(conflict = %conflict.id, error = %e, "could not score conflict");
          skipped += 1;
        }
      }
    }
    let board = self.board.sync(scored, snapshot.taken_at).await;
    info!(
      taken_at = %snapshot.taken_at,
      detected,
      added = board.added,
      archived = board.archived,
      dropped = board.dropped,
      "snapshot refreshed"
    );
    RefreshSummary { taken_at: snapshot.taken_at, detected, skipped, board }
  }

  /// Per-section load, in snapshot order.
  pub async fn sections(&self) -> Vec<SectionSummary> {
    let snapshot = self.feed.snapshot();
    let mut conflicts: HashMap<String, usize> = HashMap::new();
    for view in self.board.active().await {
      *conflicts.entry(view.conflict.location).or_default() += 1;
    }
    let detector = &self.config.detector;
    snapshot
      .sections
      .iter()
      .map(|section| {
        let approaching = snapshot
          .movements
          .iter()
          .filter(|m| m.next_waypoint == section.id && !section.occupants.contains(&m.id))
          .count();
        let status = if section.capacity_percent >= detector.congested_capacity_percent {
          SectionStatus::Congested
        } else if section.capacity_percent >= detector.active_capacity_percent {
          SectionStatus::Active
        } else {
          SectionStatus::Optimal
        };
        SectionSummary {
          id: section.id.clone(),
          name: section.name.clone(),
          kind: section.kind,
          capacity_percent: section.capacity_percent,
          trains: section.occupants.len() + approaching,
          conflicts: conflicts.get(&section.id).copied().unwrap_or(0),
          status,
        }
      })
      .collect()
  }

  /// The predefined scenarios, projected from the current schedule.
  pub fn scenarios(&self) -> Vec<SimulationScenario> {
    catalogue(&NetworkMetrics::current_schedule())
  }

  /// Queue `scenario` against the current topology.
  pub fn simulate(&self, scenario: SimulationScenario) -> Result<Uuid> {
    self.simulations.submit(scenario, self.feed.snapshot())
  }
}
