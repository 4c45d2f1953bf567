//! Background what-if simulation runs.
//!
//! Each accepted scenario gets a tokio task that owns the run's
//! `watch::Sender`, so only that task ever writes run state. Readers hold a
//! receiver and see the latest state without blocking. A semaphore bounds
//! the number of runs executing at once; queued runs wait for a permit and
//! can be cancelled while they wait. Only the newest
//! [`SimulationConfig::retained_runs`] settled runs stay queryable.

use std::{
  collections::HashMap,
  future,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use signalbox_core::{
  Error, Result,
  audit::{AuditAction, AuditEntry, AuditSink, Outcome},
  config::SimulationConfig,
  network::NetworkSnapshot,
  simulation::{NetworkMetrics, RunStatus, ScenarioId, SimulationRun, SimulationScenario, project},
};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Handle {
  state:  watch::Receiver<SimulationRun>,
  cancel: Arc<watch::Sender<bool>>,
}

#[derive(Default)]
struct Registry {
  runs:   HashMap<Uuid, Handle>,
  /// Scenario id → the latest run submitted for it.
  latest: HashMap<ScenarioId, Uuid>,
}

struct Inner<A> {
  audit:    Arc<A>,
  config:   SimulationConfig,
  permits:  Arc<Semaphore>,
  registry: Mutex<Registry>,
}

/// Schedules and tracks simulation runs.
pub struct SimulationEngine<A> {
  inner: Arc<Inner<A>>,
}

impl<A> Clone for SimulationEngine<A> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

enum Settlement {
  Completed(NetworkMetrics),
  Cancelled,
  Failed(String),
}

impl<A: AuditSink + 'static> SimulationEngine<A> {
  pub fn new(config: SimulationConfig, audit: Arc<A>) -> Self {
    let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
    Self {
      inner: Arc::new(Inner {
        audit,
        config,
        permits,
        registry: Mutex::new(Registry::default()),
      }),
    }
  }

  /// Queue a run of `scenario` against `snapshot`'s topology and return its
  /// id immediately. Must be called from within a Tokio runtime.
  ///
  /// Fails with [`Error::AlreadyRunning`] while an earlier run of the same
  /// scenario has not settled.
  pub fn submit(
    &self,
    scenario: SimulationScenario,
    snapshot: Arc<NetworkSnapshot>,
  ) -> Result<Uuid> {
    let run = SimulationRun::queued(scenario.id.clone());
    let run_id = run.id;
    let (state_tx, state_rx) = watch::channel(run);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    {
      let mut registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
      let busy = registry
        .latest
        .get(&scenario.id)
        .and_then(|id| registry.runs.get(id))
        .is_some_and(|h| !h.state.borrow().status.is_terminal());
      if busy {
        warn!(scenario = %scenario.id, "simulation refused: scenario already running");
        return Err(Error::AlreadyRunning(scenario.id));
      }
      registry.runs.insert(run_id, Handle {
        state:  state_rx,
        cancel: Arc::new(cancel_tx),
      });
      registry.latest.insert(scenario.id.clone(), run_id);
      prune(&mut registry, self.inner.config.retained_runs);
    }

    info!(run = %run_id, scenario = %scenario.id, "simulation queued");
    let inner = self.inner.clone();
    tokio::spawn(async move {
      let settlement = execute(&inner, &scenario, &snapshot, &state_tx, cancel_rx).await;
      settle(&inner, &scenario.id, state_tx, settlement).await;
    });
    Ok(run_id)
  }

  pub fn status(&self, run_id: Uuid) -> Result<SimulationRun> {
    let registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
    registry
      .runs
      .get(&run_id)
      .map(|h| h.state.borrow().clone())
      .ok_or(Error::RunNotFound(run_id))
  }

  /// Every run, oldest submission first.
  pub fn runs(&self) -> Vec<SimulationRun> {
    let registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
    let mut runs: Vec<SimulationRun> =
      registry.runs.values().map(|h| h.state.borrow().clone()).collect();
    runs.sort_by(|a, b| (a.queued_at, a.id).cmp(&(b.queued_at, b.id)));
    runs
  }

  /// Ask a run to stop and wait until it has settled. A run that already
  /// settled is returned unchanged.
  pub async fn cancel(&self, run_id: Uuid) -> Result<SimulationRun> {
    let (mut state, cancel) = {
      let registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
      let handle = registry.runs.get(&run_id).ok_or(Error::RunNotFound(run_id))?;
      (handle.state.clone(), handle.cancel.clone())
    };
    if state.borrow().status.is_terminal() {
      return Ok(state.borrow().clone());
    }

    cancel.send_replace(true);
    debug!(run = %run_id, "cancellation requested");
    let settled = state
      .wait_for(|run| run.status.is_terminal())
      .await
      .map(|run| run.clone());
    Ok(settled.unwrap_or_else(|_| state.borrow().clone()))
  }
}

/// Forget the oldest settled runs beyond `keep`.
fn prune(registry: &mut Registry, keep: usize) {
  let mut settled: Vec<(DateTime<Utc>, Uuid)> = registry
    .runs
    .iter()
    .filter_map(|(id, handle)| {
      let run = handle.state.borrow();
      run.status.is_terminal().then_some((run.queued_at, *id))
    })
    .collect();
  if settled.len() <= keep {
    return;
  }
  settled.sort_unstable();
  let excess = settled.len() - keep;
  for (_, id) in settled.into_iter().take(excess) {
    registry.runs.remove(&id);
  }
  let Registry { runs, latest } = registry;
  latest.retain(|_, id| runs.contains_key(id));
  debug!(removed = excess, "pruned settled simulation runs");
}

/// Whole percent of `steps` completed after `step`.
pub(crate) fn progress_percent(step: u32, steps: u32) -> u8 {
  let percent = u64::from(step) * 100 / u64::from(steps.max(1));
  u8::try_from(percent.min(100)).unwrap_or(100)
}

/// Resolves once cancellation has been requested. Never resolves if the
/// flag's sender is gone.
async fn cancelled(flag: &mut watch::Receiver<bool>) {
  if flag.wait_for(|c| *c).await.is_err() {
    future::pending::<()>().await;
  }
}

async fn execute<A>(
  inner: &Inner<A>,
  scenario: &SimulationScenario,
  snapshot: &NetworkSnapshot,
  state: &watch::Sender<SimulationRun>,
  mut cancel: watch::Receiver<bool>,
) -> Settlement {
  let _permit = tokio::select! {
    permit = inner.permits.clone().acquire_owned() => match permit {
      Ok(permit) => permit,
      Err(_) => return Settlement::Failed("simulation engine shut down".to_owned()),
    },
    () = cancelled(&mut cancel) => return Settlement::Cancelled,
  };
  if *cancel.borrow() {
    return Settlement::Cancelled;
  }

  state.send_modify(|run| {
    run.status = RunStatus::Running;
    run.started_at = Some(Utc::now());
  });

  let steps = inner.config.steps.max(1);
  let interval = Duration::from_millis(inner.config.step_interval_ms);
  let mut latest = None;
  for step in 1..=steps {
    if *cancel.borrow() {
      return Settlement::Cancelled;
    }
    tokio::select! {
      () = tokio::time::sleep(interval) => {}
      () = cancelled(&mut cancel) => return Settlement::Cancelled,
    }

    let fraction = f64::from(step) / f64::from(steps);
    match project(scenario, &snapshot.sections, &inner.config, fraction) {
      Ok(metrics) => latest = Some(metrics),
      Err(e) => return Settlement::Failed(e.to_string()),
    }
    let progress = progress_percent(step, steps);
    state.send_if_modified(|run| {
      if progress > run.progress {
        run.progress = progress;
        true
      } else {
        false
      }
    });
    debug!(run = %state.borrow().id, progress, "simulation progress");
  }

  match latest {
    Some(metrics) => Settlement::Completed(metrics),
    None => Settlement::Failed("simulation produced no result".to_owned()),
  }
}

/// Record the outcome, then publish the terminal state. Subscribers that
/// observe a terminal run can rely on its audit entry being written.
async fn settle<A: AuditSink>(
  inner: &Inner<A>,
  scenario_id: &str,
  state: watch::Sender<SimulationRun>,
  settlement: Settlement,
) {
  let mut run = state.borrow().clone();
  run.completed_at = Some(Utc::now());
  let (outcome, impact) = match settlement {
    Settlement::Completed(metrics) => {
      run.status = RunStatus::Completed;
      run.progress = 100;
      let impact = format!(
        "{scenario_id}: on-time {:.1}%, average delay {:.1} min, throughput {:.1}%",
        metrics.on_time_performance, metrics.average_delay_minutes, metrics.throughput_percent
      );
      run.result = Some(metrics);
      (Outcome::Success, impact)
    }
    Settlement::Cancelled => {
      run.status = RunStatus::Cancelled;
      (Outcome::Partial, format!("{scenario_id}: cancelled at {}%", run.progress))
    }
    Settlement::Failed(reason) => {
      run.status = RunStatus::Failed;
      let impact = format!("{scenario_id}: {reason}");
      run.error = Some(reason);
      (Outcome::Failure, impact)
    }
  };

  if let Some(action) = AuditAction::for_run(run.status) {
    let entry = AuditEntry {
      outcome,
      impact,
      ..AuditEntry::new(&inner.config.actor, action, &run.id.to_string())
    };
    if let Err(e) = inner.audit.append(entry).await {
      error!(run = %run.id, error = %e, "failed to record simulation outcome");
    }
  }

  info!(
    run = %run.id,
    scenario = scenario_id,
    status = run.status.as_str(),
    "simulation settled"
  );
  state.send_replace(run);

  let mut registry = inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
  prune(&mut registry, inner.config.retained_runs);
}
