//! Tests for the board, the simulation engine and the dispatcher against an
//! in-memory audit log.

use std::{io, sync::Arc, time::Duration};

use chrono::Utc;
use signalbox_core::{
  Error,
  audit::{AuditAction, AuditEntry, AuditQuery, AuditSink, Outcome},
  config::{EngineConfig, SimulationConfig},
  network::NetworkSnapshot,
  recommendation::{RecommendationStatus, Remedy},
  simulation::{
    DeclaredImpact, DisruptionKind, DisruptionParameters, NetworkMetrics, RunStatus,
    SimulationRun, SimulationScenario,
  },
};
use uuid::Uuid;

use crate::{
  ConflictView, Dispatcher, MemoryAuditLog, SectionStatus, SimulationEngine, demo,
  simulation::progress_percent,
};

const JUNCTION: &str = "CONF-JCT-B-FR-8842+IC-2501";
const PLATFORM: &str = "CONF-PLAT-2-EX-1247+LC-5603";

fn fast_config() -> EngineConfig {
  EngineConfig {
    simulation: SimulationConfig {
      steps: 4,
      step_interval_ms: 1,
      ..SimulationConfig::default()
    },
    ..EngineConfig::default()
  }
}

async fn seeded() -> (Dispatcher<MemoryAuditLog>, Arc<MemoryAuditLog>) {
  let audit = Arc::new(MemoryAuditLog::new());
  let dispatcher = Dispatcher::new(fast_config(), audit.clone());
  dispatcher.ingest(demo::snapshot(Utc::now())).await.unwrap();
  (dispatcher, audit)
}

async fn view(d: &Dispatcher<MemoryAuditLog>, id: &str) -> ConflictView {
  d.board().conflict(id).await.unwrap()
}

fn top_id(view: &ConflictView) -> String { view.recommendations[0].id.clone() }

// ─── Detection and scoring through the board ─────────────────────────────────

#[tokio::test]
async fn ingest_populates_board_with_ranked_recommendations() {
  let (d, _) = seeded().await;
  let active = d.board().active().await;
  let ids: Vec<_> = active.iter().map(|v| v.conflict.id.as_str()).collect();
  assert_eq!(ids, [JUNCTION, PLATFORM]);

  for view in &active {
    assert!(view.conflict.participants.len() >= 2);
    assert!(view.conflict.eta >= view.conflict.detected_at);
    assert_eq!(view.recommendations.iter().filter(|r| r.is_top).count(), 1);
    assert!(view.recommendations[0].is_top);
    assert!(view.recommendations.iter().all(|r| r.confidence <= 100));
    assert!(view.recommendations.iter().all(|r| r.version == 1));
  }
}

#[tokio::test]
async fn identical_snapshot_yields_identical_board() {
  let (d, _) = seeded().await;
  let before: Vec<_> = d.board().active().await.into_iter().map(|v| top_id(&v)).collect();
  let summary = d.refresh().await;
  assert_eq!(summary.board.added, 0);
  assert_eq!(summary.board.kept, 2);
  let after: Vec<_> = d.board().active().await.into_iter().map(|v| top_id(&v)).collect();
  assert_eq!(before, after);
}

#[tokio::test]
async fn invalid_snapshot_is_rejected_without_touching_board() {
  let (d, _) = seeded().await;
  let mut bad = demo::snapshot(Utc::now());
  bad.movements[0].next_waypoint = "NOWHERE".into();
  let err = d.ingest(bad).await.unwrap_err();
  assert!(matches!(err, Error::InvalidSnapshot(_)));
  assert_eq!(d.board().active().await.len(), 2);
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn accept_then_implement_resolves_conflict() {
  let (d, audit) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);

  let accepted = d.board().accept(&rec, 1, "controller_001").await.unwrap();
  assert_eq!(accepted.status, RecommendationStatus::Approved);
  assert_eq!(accepted.version, 2);
  assert!(!view(&d, JUNCTION).await.conflict.resolved);

  let done = d.board().implement(&rec, 2, "controller_001").await.unwrap();
  assert_eq!(done.status, RecommendationStatus::Implemented);
  assert!(view(&d, JUNCTION).await.conflict.resolved);

  let active = d.board().active().await;
  assert!(active.iter().all(|v| v.conflict.id != JUNCTION));

  let entries = audit.entries().await;
  let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
  assert_eq!(actions, [AuditAction::Accept, AuditAction::Implement]);
  for entry in &entries {
    assert_eq!(entry.actor, "controller_001");
    assert_eq!(entry.subject, rec);
    assert_eq!(entry.trains, ["FR-8842", "IC-2501"]);
    assert_eq!(entry.outcome, Outcome::Success);
    assert!(!entry.overridden);
  }
}

#[tokio::test]
async fn reject_never_resolves() {
  let (d, audit) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);

  let rejected = d.board().reject(&rec, 1, "controller_002").await.unwrap();
  assert_eq!(rejected.status, RecommendationStatus::Rejected);
  assert!(!view(&d, JUNCTION).await.conflict.resolved);

  for result in [
    d.board().accept(&rec, 2, "controller_002").await,
    d.board().implement(&rec, 2, "controller_002").await,
    d.board().reject(&rec, 2, "controller_002").await,
  ] {
    assert!(matches!(result, Err(Error::InvalidTransition { .. })), "{result:?}");
  }
  assert_eq!(audit.len().await, 1);
}

#[tokio::test]
async fn implement_requires_approval() {
  let (d, audit) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);
  let err = d.board().implement(&rec, 1, "op").await.unwrap_err();
  assert!(matches!(err, Error::InvalidTransition {
    from: RecommendationStatus::Pending,
    ..
  }));
  assert!(audit.is_empty().await);
}

#[tokio::test]
async fn stale_version_is_refused() {
  let (d, audit) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);
  d.board().accept(&rec, 1, "a").await.unwrap();

  let err = d.board().implement(&rec, 1, "b").await.unwrap_err();
  assert!(matches!(err, Error::StaleVersion { expected: 1, actual: 2, .. }));
  assert_eq!(d.board().recommendation(&rec).await.unwrap().status, RecommendationStatus::Approved);
  assert_eq!(audit.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_have_one_winner() {
  let (d, audit) = seeded().await;
  let d = Arc::new(d);
  let rec = top_id(&view(&d, JUNCTION).await);

  let tasks: Vec<_> = ["controller_001", "controller_002"]
    .into_iter()
    .map(|actor| {
      let d = d.clone();
      let rec = rec.clone();
      tokio::spawn(async move { d.board().accept(&rec, 1, actor).await })
    })
    .collect();
  let mut results = Vec::new();
  for task in tasks {
    results.push(task.await.unwrap());
  }

  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(
    results
      .iter()
      .any(|r| matches!(r, Err(Error::StaleVersion { expected: 1, actual: 2, .. })))
  );

  let rec = d.board().recommendation(&rec).await.unwrap();
  assert_eq!(rec.status, RecommendationStatus::Approved);
  assert_eq!(rec.version, 2);
  assert_eq!(audit.len().await, 1);
}

#[tokio::test]
async fn sibling_cannot_be_accepted_once_one_is_approved() {
  let (d, _) = seeded().await;
  let v = view(&d, JUNCTION).await;
  assert!(v.recommendations.len() >= 2);
  let (top, alt) = (&v.recommendations[0].id, &v.recommendations[1].id);

  d.board().accept(top, 1, "op").await.unwrap();
  let err = d.board().accept(alt, 1, "op").await.unwrap_err();
  assert!(matches!(err, Error::InvalidTransition { .. }));

  // Rejecting an alternative is still allowed.
  d.board().reject(alt, 1, "op").await.unwrap();
}

#[tokio::test]
async fn accepting_an_alternative_is_recorded_as_override() {
  let (d, audit) = seeded().await;
  let v = view(&d, JUNCTION).await;
  let alt = &v.recommendations[1].id;

  d.board().accept(alt, 1, "controller_003").await.unwrap();
  let entries = audit.entries().await;
  assert!(entries[0].overridden);

  let stats = d.board().stats();
  assert_eq!(stats.decisions, 1);
  assert_eq!(stats.overrides, 1);
  assert!((stats.override_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn modify_replaces_remedy_and_marks_manual() {
  let (d, audit) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);

  let hold = Remedy::Hold { train: "FR-8842".into(), minutes: 4 };
  let modified = d.board().modify(&rec, 1, "controller_001", hold.clone()).await.unwrap();
  assert_eq!(modified.status, RecommendationStatus::Pending);
  assert_eq!(modified.version, 2);
  assert!(modified.manual);
  assert_eq!(modified.remedy, hold);
  assert_eq!(modified.title, "Hold FR-8842 for 4 min");

  let entries = audit.entries().await;
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].action, AuditAction::Modify);
  assert!(entries[0].overridden);

  // The modified recommendation can still be accepted at its new version.
  d.board().accept(&rec, 2, "controller_001").await.unwrap();
}

#[tokio::test]
async fn modify_with_foreign_train_is_refused() {
  let (d, audit) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);

  let hold = Remedy::Hold { train: "EX-1247".into(), minutes: 4 };
  let err = d.board().modify(&rec, 1, "op", hold).await.unwrap_err();
  assert!(matches!(err, Error::InvalidRemedy(_)));
  assert_eq!(d.board().recommendation(&rec).await.unwrap().version, 1);
  assert!(audit.is_empty().await);
}

#[tokio::test]
async fn override_resolves_once() {
  let (d, audit) = seeded().await;
  let conflict = d
    .board()
    .override_resolve(PLATFORM, "supervisor", "handled by signaller")
    .await
    .unwrap();
  assert!(conflict.resolved);

  let err = d.board().override_resolve(PLATFORM, "supervisor", "again").await.unwrap_err();
  assert!(matches!(err, Error::AlreadyResolved(_)));

  let rec = top_id(&view(&d, PLATFORM).await);
  let err = d.board().accept(&rec, 1, "op").await.unwrap_err();
  assert!(matches!(err, Error::AlreadyResolved(_)));

  let entries = audit.entries().await;
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].action, AuditAction::OverrideResolve);
  assert!(entries[0].overridden);
  assert_eq!(entries[0].impact, "handled by signaller");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
  let (d, _) = seeded().await;
  assert!(d.board().accept("REC-nope", 1, "op").await.unwrap_err().is_not_found());
  assert!(d.board().conflict("CONF-nope").await.unwrap_err().is_not_found());
  assert!(d.board().override_resolve("CONF-nope", "op", "").await.unwrap_err().is_not_found());
}

// ─── Sync ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resync_keeps_decisions_and_archives_resolved() {
  let (d, _) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);
  d.board().accept(&rec, 1, "op").await.unwrap();
  d.board().override_resolve(PLATFORM, "op", "cleared").await.unwrap();

  let summary = d.refresh().await;
  assert_eq!(summary.board.archived, 1);
  assert_eq!(summary.board.kept, 1);
  assert_eq!(d.board().recommendation(&rec).await.unwrap().status, RecommendationStatus::Approved);

  // Still detected, but resolved conflicts stay off the board.
  d.refresh().await;
  assert!(d.board().conflict(PLATFORM).await.is_err());
}

#[tokio::test]
async fn vanished_conflicts_drop_unless_approved() {
  let (d, _) = seeded().await;
  let rec = top_id(&view(&d, JUNCTION).await);
  d.board().accept(&rec, 1, "op").await.unwrap();

  let mut quiet = demo::snapshot(Utc::now());
  quiet.movements.clear();
  let summary = d.ingest(quiet).await.unwrap();
  assert_eq!(summary.detected, 0);
  assert_eq!(summary.board.dropped, 1);

  assert!(d.board().conflict(JUNCTION).await.is_ok());
  assert!(d.board().conflict(PLATFORM).await.is_err());
}

#[tokio::test]
async fn passed_conflicts_are_archived() {
  let (d, _) = seeded().await;
  let mut later = demo::snapshot(Utc::now());
  later.taken_at += chrono::Duration::hours(2);
  let summary = d.ingest(later).await.unwrap();
  assert_eq!(summary.board.archived, 2);
  assert!(d.board().active().await.is_empty());
}

// ─── Audit sink failures ─────────────────────────────────────────────────────

struct BrokenSink;

impl AuditSink for BrokenSink {
  type Error = io::Error;

  async fn append(&self, _entry: AuditEntry) -> io::Result<()> {
    Err(io::Error::other("disk full"))
  }

  async fn query(&self, _query: &AuditQuery) -> io::Result<Vec<AuditEntry>> { Ok(Vec::new()) }
}

#[tokio::test]
async fn failed_audit_append_leaves_state_untouched() {
  let d = Dispatcher::new(fast_config(), Arc::new(BrokenSink));
  d.ingest(demo::snapshot(Utc::now())).await.unwrap();
  let v = d.board().conflict(JUNCTION).await.unwrap();
  let rec = &v.recommendations[0].id;

  let err = d.board().accept(rec, 1, "op").await.unwrap_err();
  assert!(matches!(err, Error::Audit(_)));
  let rec = d.board().recommendation(rec).await.unwrap();
  assert_eq!(rec.status, RecommendationStatus::Pending);
  assert_eq!(rec.version, 1);
  assert_eq!(d.board().stats().decisions, 0);
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn section_summary_reports_load_and_conflicts() {
  let (d, _) = seeded().await;
  let sections = d.sections().await;
  let plat2 = sections.iter().find(|s| s.id == "PLAT-2").unwrap();
  assert_eq!(plat2.trains, 2);
  assert_eq!(plat2.conflicts, 1);
  assert_eq!(plat2.status, SectionStatus::Congested);

  let plat4 = sections.iter().find(|s| s.id == "PLAT-4").unwrap();
  assert_eq!(plat4.trains, 0);
  assert_eq!(plat4.status, SectionStatus::Optimal);

  let junction = sections.iter().find(|s| s.id == "JCT-B").unwrap();
  assert_eq!(junction.status, SectionStatus::Active);
}

// ─── Simulation ──────────────────────────────────────────────────────────────

fn scenario(id: &str, delay_factor: f64, duration: f64) -> SimulationScenario {
  SimulationScenario {
    id:          id.into(),
    name:        id.into(),
    description: String::new(),
    disruption:  DisruptionParameters {
      kind:                 DisruptionKind::Weather,
      delay_factor_minutes: delay_factor,
      affected_sections:    Vec::new(),
      duration_minutes:     duration,
    },
    impact:      DeclaredImpact::default(),
    baseline:    NetworkMetrics::current_schedule(),
  }
}

fn sim_engine(steps: u32, step_interval_ms: u64) -> (SimulationEngine<MemoryAuditLog>, Arc<MemoryAuditLog>) {
  let audit = Arc::new(MemoryAuditLog::new());
  let config = SimulationConfig { steps, step_interval_ms, ..SimulationConfig::default() };
  (SimulationEngine::new(config, audit.clone()), audit)
}

fn topology() -> Arc<NetworkSnapshot> { Arc::new(demo::snapshot(Utc::now())) }

async fn settled(engine: &SimulationEngine<MemoryAuditLog>, id: Uuid) -> SimulationRun {
  tokio::time::timeout(Duration::from_secs(10), async {
    loop {
      let run = engine.status(id).unwrap();
      if run.status.is_terminal() {
        return run;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("run did not settle")
}

#[tokio::test]
async fn weather_delay_degrades_on_time_performance() {
  let (engine, audit) = sim_engine(5, 1);
  let id = engine.submit(scenario("WEATHER", 8.0, 120.0), topology()).unwrap();
  let run = settled(&engine, id).await;

  assert_eq!(run.status, RunStatus::Completed);
  assert_eq!(run.progress, 100);
  assert!(run.started_at.is_some() && run.completed_at.is_some());
  let result = run.result.unwrap();
  assert!(result.on_time_performance < 94.2);
  assert!(result.on_time_performance >= 0.0);
  assert!(result.average_delay_minutes > 2.4);

  let entries = audit.entries().await;
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].action, AuditAction::SimulationCompleted);
  assert_eq!(entries[0].outcome, Outcome::Success);
  assert_eq!(entries[0].subject, id.to_string());
}

#[tokio::test]
async fn second_submit_while_running_is_refused() {
  let (engine, _) = sim_engine(50, 20);
  let first = engine.submit(scenario("PEAK", 2.0, 60.0), topology()).unwrap();
  let err = engine.submit(scenario("PEAK", 2.0, 60.0), topology()).unwrap_err();
  assert!(matches!(err, Error::AlreadyRunning(ref s) if s == "PEAK"));

  // Other scenarios are unaffected.
  engine.submit(scenario("OTHER", 2.0, 60.0), topology()).unwrap();

  engine.cancel(first).await.unwrap();
  engine.submit(scenario("PEAK", 2.0, 60.0), topology()).unwrap();
}

#[tokio::test]
async fn cancel_settles_run_and_records_partial_outcome() {
  let (engine, audit) = sim_engine(1000, 20);
  let id = engine.submit(scenario("LONG", 4.0, 60.0), topology()).unwrap();

  let run = engine.cancel(id).await.unwrap();
  assert_eq!(run.status, RunStatus::Cancelled);
  assert!(run.result.is_none());

  let entries = audit.entries().await;
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].action, AuditAction::SimulationCancelled);
  assert_eq!(entries[0].outcome, Outcome::Partial);
}

#[tokio::test]
async fn cancel_after_completion_changes_nothing() {
  let (engine, audit) = sim_engine(2, 1);
  let id = engine.submit(scenario("SHORT", 1.0, 30.0), topology()).unwrap();
  let done = settled(&engine, id).await;

  let again = engine.cancel(id).await.unwrap();
  assert_eq!(again, done);
  assert_eq!(again.status, RunStatus::Completed);
  assert_eq!(audit.len().await, 1);
}

#[tokio::test]
async fn queued_run_can_be_cancelled_before_it_starts() {
  let audit = Arc::new(MemoryAuditLog::new());
  let config = SimulationConfig {
    steps: 1000,
    step_interval_ms: 20,
    max_concurrent_runs: 1,
    ..SimulationConfig::default()
  };
  let engine = SimulationEngine::new(config, audit);
  let running = engine.submit(scenario("A", 1.0, 30.0), topology()).unwrap();
  let queued = engine.submit(scenario("B", 1.0, 30.0), topology()).unwrap();

  let run = engine.cancel(queued).await.unwrap();
  assert_eq!(run.status, RunStatus::Cancelled);
  assert!(run.started_at.is_none());
  engine.cancel(running).await.unwrap();
}

#[tokio::test]
async fn invalid_parameters_fail_the_run() {
  let (engine, audit) = sim_engine(3, 1);
  let id = engine.submit(scenario("BROKEN", f64::NAN, 30.0), topology()).unwrap();
  let run = settled(&engine, id).await;

  assert_eq!(run.status, RunStatus::Failed);
  assert!(run.error.is_some());
  assert!(run.result.is_none());
  let entries = audit.entries().await;
  assert_eq!(entries[0].action, AuditAction::SimulationFailed);
  assert_eq!(entries[0].outcome, Outcome::Failure);
}

#[tokio::test]
async fn unknown_affected_section_fails_the_run() {
  let (engine, audit) = sim_engine(3, 1);
  let mut s = scenario("CLOSURE", 8.0, 120.0);
  s.disruption.affected_sections = vec!["PLAT-9".into()];
  let id = engine.submit(s, topology()).unwrap();
  let run = settled(&engine, id).await;

  assert_eq!(run.status, RunStatus::Failed);
  assert!(run.error.as_deref().is_some_and(|e| e.contains("PLAT-9")));
  assert!(run.result.is_none());
  assert_eq!(audit.entries().await[0].action, AuditAction::SimulationFailed);
}

#[tokio::test]
async fn catalogue_degrades_demo_network() {
  let (d, _) = seeded().await;
  for scenario in d.scenarios().into_iter().filter(|s| s.disruption.delay_factor_minutes > 0.0) {
    let id = d.simulate(scenario.clone()).unwrap();
    let run = settled(d.simulations(), id).await;
    assert_eq!(run.status, RunStatus::Completed, "{}", scenario.id);
    let result = run.result.unwrap();
    assert!(result.on_time_performance < 94.2, "{}", scenario.id);
    assert!(result.average_delay_minutes > 2.4, "{}", scenario.id);
  }
}

#[tokio::test]
async fn progress_never_decreases() {
  let (engine, _) = sim_engine(10, 2);
  let id = engine.submit(scenario("WATCH", 5.0, 90.0), topology()).unwrap();
  let mut last = 0;
  loop {
    let run = engine.status(id).unwrap();
    assert!(run.progress >= last);
    last = run.progress;
    if run.status.is_terminal() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
  }
  assert_eq!(last, 100);
}

#[tokio::test]
async fn only_newest_settled_runs_are_retained() {
  let audit = Arc::new(MemoryAuditLog::new());
  let config = SimulationConfig {
    steps: 1,
    step_interval_ms: 1,
    retained_runs: 2,
    ..SimulationConfig::default()
  };
  let engine = SimulationEngine::new(config, audit.clone());

  let mut ids = Vec::new();
  for name in ["R1", "R2", "R3", "R4"] {
    let id = engine.submit(scenario(name, 1.0, 30.0), topology()).unwrap();
    settled(&engine, id).await;
    ids.push(id);
  }

  let kept: Vec<_> = engine.runs().into_iter().map(|r| r.id).collect();
  assert_eq!(kept, &ids[2..]);
  assert!(engine.status(ids[0]).unwrap_err().is_not_found());
  // The audit trail keeps every run.
  assert_eq!(audit.len().await, 4);
}

#[test]
fn progress_percent_handles_huge_step_counts() {
  assert_eq!(progress_percent(1, 4), 25);
  assert_eq!(progress_percent(u32::MAX, u32::MAX), 100);
  assert_eq!(progress_percent(u32::MAX / 2, u32::MAX), 49);
  assert_eq!(progress_percent(3, 0), 100);
}

#[tokio::test]
async fn unknown_run_is_not_found() {
  let (engine, _) = sim_engine(1, 1);
  let id = Uuid::new_v4();
  assert!(matches!(engine.status(id), Err(Error::RunNotFound(r)) if r == id));
  assert!(engine.cancel(id).await.unwrap_err().is_not_found());
  assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn dispatcher_simulates_against_current_topology() {
  let (d, audit) = seeded().await;
  let scenario = d.scenarios().into_iter().find(|s| s.id == "WEATHER_001").unwrap();
  let id = d.simulate(scenario).unwrap();
  let run = settled(d.simulations(), id).await;
  assert_eq!(run.status, RunStatus::Completed);
  assert_eq!(d.simulations().runs().len(), 1);

  let q = AuditQuery { action: Some(AuditAction::SimulationCompleted), ..AuditQuery::default() };
  assert_eq!(audit.query(&q).await.unwrap().len(), 1);
}
