//! The decision board: live conflicts, their ranked recommendations, and the
//! operator actions that move recommendations through their lifecycle.
//!
//! Each conflict sits behind its own async mutex, so actions on unrelated
//! conflicts never wait on one another. The outer map lock is held only long
//! enough to find an entry, except during [`DecisionBoard::sync`], which
//! takes it exclusively.
//!
//! Every transition checks the caller's version under the entry lock and
//! appends its audit entry before the change becomes visible. If the sink
//! fails, nothing changes.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalbox_core::{
  Error, Result,
  audit::{AuditAction, AuditEntry, AuditSink},
  conflict::{Conflict, conflict_order},
  recommendation::{DecisionAction, Recommendation, RecommendationStatus, Remedy},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// ─── Views ───────────────────────────────────────────────────────────────────

/// A conflict together with its recommendations, ordered by rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictView {
  pub conflict:        Conflict,
  pub recommendations: Vec<Recommendation>,
  /// Whether the top suggestion's confidence reaches the automatic
  /// implementation threshold. Advisory only.
  pub auto_eligible:   bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
  /// Successful operator transitions, including override resolutions.
  pub decisions:     u64,
  /// Decisions that departed from the engine's top suggestion.
  pub overrides:     u64,
  /// `overrides / decisions`, or 0 before any decision.
  pub override_rate: f64,
}

/// What a [`DecisionBoard::sync`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
  pub added:    usize,
  pub kept:     usize,
  /// Resolved or past their eta.
  pub archived: usize,
  /// No longer detected and no decision in progress.
  pub dropped:  usize,
}

// ─── Board ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry {
  conflict:        Conflict,
  recommendations: Vec<Recommendation>,
  /// Set when `sync` removes the entry, so an action racing the removal
  /// fails instead of editing an orphan.
  retired:         bool,
}

#[derive(Debug, Default)]
struct Registry {
  conflicts: BTreeMap<String, Arc<Mutex<Entry>>>,
  /// Recommendation id → conflict id.
  owners:    HashMap<String, String>,
  /// Resolved conflicts the feed still reports. They are not re-added until
  /// they disappear from detection.
  archived:  HashSet<String>,
}

pub struct DecisionBoard<A> {
  audit:          Arc<A>,
  auto_threshold: u8,
  registry:       RwLock<Registry>,
  decisions:      AtomicU64,
  overrides:      AtomicU64,
}

impl<A: AuditSink> DecisionBoard<A> {
  pub fn new(audit: Arc<A>, auto_threshold: u8) -> Self {
    Self {
      audit,
      auto_threshold,
      registry: RwLock::new(Registry::default()),
      decisions: AtomicU64::new(0),
      overrides: AtomicU64::new(0),
    }
  }

  // ── Reads ──────────────────────────────────────────────────────────────────

  /// Unresolved conflicts, soonest first.
  pub async fn active(&self) -> Vec<ConflictView> {
    let entries: Vec<_> = self.registry.read().await.conflicts.values().cloned().collect();
    let mut views = Vec::with_capacity(entries.len());
    for entry in entries {
      let entry = entry.lock().await;
      if !entry.retired && !entry.conflict.resolved {
        views.push(self.view(&entry));
      }
    }
    views.sort_by(|a, b| conflict_order(&a.conflict, &b.conflict));
    views
  }

  pub async fn conflict(&self, id: &str) -> Result<ConflictView> {
    let entry = self
      .registry
      .read()
      .await
      .conflicts
      .get(id)
      .cloned()
      .ok_or_else(|| Error::ConflictNotFound(id.to_owned()))?;
    let entry = entry.lock().await;
    if entry.retired {
      return Err(Error::ConflictNotFound(id.to_owned()));
    }
    Ok(self.view(&entry))
  }

  pub async fn recommendation(&self, id: &str) -> Result<Recommendation> {
    let entry = self.owner_of(id).await?;
    let entry = entry.lock().await;
    entry
      .recommendations
      .iter()
      .find(|r| r.id == id)
      .filter(|_| !entry.retired)
      .cloned()
      .ok_or_else(|| Error::RecommendationNotFound(id.to_owned()))
  }

  pub fn stats(&self) -> DecisionStats {
    let decisions = self.decisions.load(Ordering::Relaxed);
    let overrides = self.overrides.load(Ordering::Relaxed);
    DecisionStats {
      decisions,
      overrides,
      override_rate: if decisions == 0 {
        0.0
      } else {
        overrides as f64 / decisions as f64
      },
    }
  }

  // ── Transitions ────────────────────────────────────────────────────────────

  pub async fn accept(&self, id: &str, version: u64, actor: &str) -> Result<Recommendation> {
    self.transition(id, version, actor, DecisionAction::Accept, None).await
  }

  pub async fn reject(&self, id: &str, version: u64, actor: &str) -> Result<Recommendation> {
    self.transition(id, version, actor, DecisionAction::Reject, None).await
  }

  /// Replace the remedy of a pending recommendation. The recommendation is
  /// marked manual and stays pending.
  pub async fn modify(
    &self,
    id: &str,
    version: u64,
    actor: &str,
    remedy: Remedy,
  ) -> Result<Recommendation> {
    self
      .transition(id, version, actor, DecisionAction::Modify, Some(remedy))
      .await
  }

  /// Mark an approved recommendation implemented. This resolves its
  /// conflict.
  pub async fn implement(&self, id: &str, version: u64, actor: &str) -> Result<Recommendation> {
    self.transition(id, version, actor, DecisionAction::Implement, None).await
  }

  /// Resolve a conflict without implementing any of its recommendations.
  pub async fn override_resolve(
    &self,
    conflict_id: &str,
    actor: &str,
    note: &str,
  ) -> Result<Conflict> {
    let entry = self
      .registry
      .read()
      .await
      .conflicts
      .get(conflict_id)
      .cloned()
      .ok_or_else(|| Error::ConflictNotFound(conflict_id.to_owned()))?;
    let mut entry = entry.lock().await;
    if entry.retired {
      return Err(Error::ConflictNotFound(conflict_id.to_owned()));
    }
    if entry.conflict.resolved {
      warn!(conflict = conflict_id, actor, "override refused: already resolved");
      return Err(Error::AlreadyResolved(conflict_id.to_owned()));
    }

    self
      .record(AuditEntry {
        trains: entry.conflict.participants.clone(),
        overridden: true,
        impact: note.to_owned(),
        ..AuditEntry::new(actor, AuditAction::OverrideResolve, conflict_id)
      })
      .await?;

    entry.conflict.resolved = true;
    self.count(true);
    info!(conflict = conflict_id, actor, "conflict resolved by override");
    Ok(entry.conflict.clone())
  }

  async fn transition(
    &self,
    id: &str,
    version: u64,
    actor: &str,
    action: DecisionAction,
    remedy: Option<Remedy>,
  ) -> Result<Recommendation> {
    let entry = self.owner_of(id).await?;
    let mut guard = entry.lock().await;
    let Entry { conflict, recommendations, retired } = &mut *guard;
    if *retired {
      return Err(Error::RecommendationNotFound(id.to_owned()));
    }
    let index = recommendations
      .iter()
      .position(|r| r.id == id)
      .ok_or_else(|| Error::RecommendationNotFound(id.to_owned()))?;
    let current = &recommendations[index];

    if current.version != version {
      warn!(
        recommendation = id,
        expected = version,
        actual = current.version,
        action = action.as_str(),
        "stale version"
      );
      return Err(Error::StaleVersion {
        id: id.to_owned(),
        expected: version,
        actual: current.version,
      });
    }
    if conflict.resolved {
      warn!(recommendation = id, action = action.as_str(), "conflict already resolved");
      return Err(Error::AlreadyResolved(conflict.id.clone()));
    }
    let refused = || Error::InvalidTransition {
      id:     id.to_owned(),
      from:   current.status,
      action: action.as_str(),
    };
    let Some(status) = current.status.apply(action) else {
      warn!(recommendation = id, from = %current.status, action = action.as_str(), "invalid transition");
      return Err(refused());
    };
    if action == DecisionAction::Accept {
      if let Some(sibling) = recommendations.iter().find(|r| {
        r.id != id
          && matches!(
            r.status,
            RecommendationStatus::Approved | RecommendationStatus::Implemented
          )
      }) {
        warn!(recommendation = id, sibling = %sibling.id, "another recommendation already approved");
        return Err(refused());
      }
    }

    let mut updated = current.clone();
    updated.status = status;
    updated.version += 1;
    updated.modified_at = Utc::now();
    if let Some(remedy) = remedy {
      remedy.validate_for(conflict)?;
      updated.title = remedy.title();
      updated.description = remedy.describe(conflict);
      updated.remedy = remedy;
      updated.manual = true;
    }
    let overridden = updated.diverges();

    self
      .record(AuditEntry {
        trains: conflict.participants.clone(),
        overridden,
        impact: updated.impact.summary.clone(),
        ..AuditEntry::new(actor, action.into(), id)
      })
      .await?;

    if status == RecommendationStatus::Implemented {
      conflict.resolved = true;
    }
    recommendations[index] = updated.clone();
    self.count(overridden);
    info!(
      recommendation = id,
      actor,
      action = action.as_str(),
      status = %updated.status,
      version = updated.version,
      overridden,
      "recommendation updated"
    );
    Ok(updated)
  }

  // ── Feed refresh ───────────────────────────────────────────────────────────

  /// Merge a fresh detection pass into the board.
  ///
  /// Conflicts that are resolved or whose eta is before `now` are archived.
  /// Newly detected conflicts are added with their recommendations; those
  /// already on the board keep their recommendation state and only take the
  /// refreshed detection fields. Conflicts that were not detected again are
  /// dropped unless a recommendation has been approved.
  pub async fn sync(
    &self,
    detected: Vec<(Conflict, Vec<Recommendation>)>,
    now: DateTime<Utc>,
  ) -> SyncSummary {
    let mut registry = self.registry.write().await;
    let mut summary = SyncSummary::default();
    let fresh: HashSet<String> = detected.iter().map(|(c, _)| c.id.clone()).collect();
    registry.archived.retain(|id| fresh.contains(id));

    let existing: Vec<(String, Arc<Mutex<Entry>>)> = registry
      .conflicts
      .iter()
      .map(|(id, entry)| (id.clone(), entry.clone()))
      .collect();
    for (id, entry) in existing {
      let mut entry = entry.lock().await;
      let archive = entry.conflict.resolved || entry.conflict.eta < now;
      let in_progress = entry
        .recommendations
        .iter()
        .any(|r| r.status == RecommendationStatus::Approved);
      let vanished = !fresh.contains(&id) && !in_progress;
      if !(archive || vanished) {
        continue;
      }
      entry.retired = true;
      for rec in &entry.recommendations {
        registry.owners.remove(&rec.id);
      }
      registry.conflicts.remove(&id);
      if archive {
        if entry.conflict.resolved {
          registry.archived.insert(id.clone());
        }
        summary.archived += 1;
        debug!(conflict = %id, resolved = entry.conflict.resolved, "conflict archived");
      } else {
        summary.dropped += 1;
        debug!(conflict = %id, "conflict no longer detected");
      }
    }

    for (conflict, recommendations) in detected {
      if registry.archived.contains(&conflict.id) || conflict.eta < now {
        continue;
      }
      if let Some(entry) = registry.conflicts.get(&conflict.id) {
        let mut entry = entry.lock().await;
        let resolved = entry.conflict.resolved;
        entry.conflict = Conflict { resolved, ..conflict };
        summary.kept += 1;
        continue;
      }
      for rec in &recommendations {
        registry.owners.insert(rec.id.clone(), conflict.id.clone());
      }
      debug!(conflict = %conflict.id, severity = ?conflict.severity, "conflict added");
      registry.conflicts.insert(
        conflict.id.clone(),
        Arc::new(Mutex::new(Entry { conflict, recommendations, retired: false })),
      );
      summary.added += 1;
    }

    summary
  }

  // ── Helpers ────────────────────────────────────────────────────────────────

  async fn owner_of(&self, recommendation_id: &str) -> Result<Arc<Mutex<Entry>>> {
    let registry = self.registry.read().await;
    registry
      .owners
      .get(recommendation_id)
      .and_then(|conflict_id| registry.conflicts.get(conflict_id))
      .cloned()
      .ok_or_else(|| Error::RecommendationNotFound(recommendation_id.to_owned()))
  }

  async fn record(&self, entry: AuditEntry) -> Result<()> {
    self.audit.append(entry).await.map_err(|e| Error::Audit(Box::new(e)))
  }

  fn count(&self, overridden: bool) {
    self.decisions.fetch_add(1, Ordering::Relaxed);
    if overridden {
      self.overrides.fetch_add(1, Ordering::Relaxed);
    }
  }

  fn view(&self, entry: &Entry) -> ConflictView {
    let mut recommendations = entry.recommendations.clone();
    recommendations.sort_by_key(|r| r.rank);
    let auto_eligible = !entry.conflict.resolved
      && recommendations
        .iter()
        .find(|r| r.is_top)
        .is_some_and(|r| r.confidence >= self.auto_threshold);
    ConflictView { conflict: entry.conflict.clone(), recommendations, auto_eligible }
  }
}
