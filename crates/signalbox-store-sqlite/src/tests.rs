//! Integration tests for `SqliteAuditLog` against an in-memory database.

use chrono::{Duration, Utc};
use signalbox_core::audit::{AuditAction, AuditEntry, AuditQuery, AuditSink, Outcome};

use crate::SqliteAuditLog;

async fn log() -> SqliteAuditLog {
  SqliteAuditLog::open_in_memory()
    .await
    .expect("in-memory log")
}

fn decision(actor: &str, action: AuditAction, trains: &[&str], minutes_ago: i64) -> AuditEntry {
  AuditEntry {
    timestamp: Utc::now() - Duration::minutes(minutes_ago),
    trains: trains.iter().map(|t| (*t).to_owned()).collect(),
    impact: format!("{actor} {}", action.as_str()),
    ..AuditEntry::new(actor, action, "REC-CONF-JCT-B-FR-8842+IC-2501-precedence")
  }
}

async fn seeded() -> SqliteAuditLog {
  let log = log().await;
  for entry in [
    decision("controller_001", AuditAction::Accept, &["IC-2501", "FR-8842"], 30),
    decision("controller_002", AuditAction::Reject, &["EX-1247", "LC-5603"], 20),
    AuditEntry {
      overridden: true,
      ..decision("controller_001", AuditAction::Modify, &["EX-1247", "LC-5603"], 10)
    },
    AuditEntry {
      outcome: Outcome::Partial,
      impact: "WEATHER_001: cancelled at 40%".into(),
      ..AuditEntry::new("system_sim", AuditAction::SimulationCancelled, "run-1")
    },
  ] {
    log.append(entry).await.unwrap();
  }
  log
}

// ─── Append / read back ──────────────────────────────────────────────────────

#[tokio::test]
async fn append_and_read_back() {
  let log = log().await;
  let entry = decision("controller_001", AuditAction::Implement, &["IC-2501"], 0);
  log.append(entry.clone()).await.unwrap();

  let all = log.query(&AuditQuery::default()).await.unwrap();
  assert_eq!(all.len(), 1);
  let got = &all[0];
  assert_eq!(got.id, entry.id);
  assert_eq!(got.actor, entry.actor);
  assert_eq!(got.action, AuditAction::Implement);
  assert_eq!(got.trains, ["IC-2501"]);
  assert_eq!(got.outcome, Outcome::Success);
  assert!(!got.overridden);
  assert_eq!(got.impact, entry.impact);
  assert_eq!(got.timestamp.timestamp_micros(), entry.timestamp.timestamp_micros());
}

#[tokio::test]
async fn query_is_newest_first() {
  let log = seeded().await;
  let all = log.query(&AuditQuery::default()).await.unwrap();
  let actions: Vec<_> = all.iter().map(|e| e.action).collect();
  assert_eq!(actions, [
    AuditAction::SimulationCancelled,
    AuditAction::Modify,
    AuditAction::Reject,
    AuditAction::Accept,
  ]);
}

#[tokio::test]
async fn entries_cannot_be_rewritten() {
  let log = seeded().await;
  let updated = log
    .connection()
    .call(|conn| Ok(conn.execute("UPDATE audit_entries SET actor = 'mallory'", [])?))
    .await;
  assert!(updated.is_err());
  let deleted = log
    .connection()
    .call(|conn| Ok(conn.execute("DELETE FROM audit_entries", [])?))
    .await;
  assert!(deleted.is_err());
  assert_eq!(log.query(&AuditQuery::default()).await.unwrap().len(), 4);
}

// ─── Filters ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn filter_by_actor_and_action() {
  let log = seeded().await;
  let q = AuditQuery { actor: Some("controller_001".into()), ..AuditQuery::default() };
  assert_eq!(log.query(&q).await.unwrap().len(), 2);

  let q = AuditQuery { action: Some(AuditAction::Reject), ..AuditQuery::default() };
  let hits = log.query(&q).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].actor, "controller_002");
}

#[tokio::test]
async fn filter_by_train() {
  let log = seeded().await;
  let q = AuditQuery { train: Some("LC-5603".into()), ..AuditQuery::default() };
  assert_eq!(log.query(&q).await.unwrap().len(), 2);

  // Exact membership, not a substring of another id.
  let q = AuditQuery { train: Some("LC-56".into()), ..AuditQuery::default() };
  assert!(log.query(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn filter_by_overridden() {
  let log = seeded().await;
  let q = AuditQuery { overridden: Some(true), ..AuditQuery::default() };
  let hits = log.query(&q).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].action, AuditAction::Modify);
}

#[tokio::test]
async fn free_text_is_case_insensitive() {
  let log = seeded().await;
  let q = AuditQuery { text: Some("weather".into()), ..AuditQuery::default() };
  assert_eq!(log.query(&q).await.unwrap().len(), 1);

  let q = AuditQuery { text: Some("ex-1247".into()), ..AuditQuery::default() };
  assert_eq!(log.query(&q).await.unwrap().len(), 2);

  let q = AuditQuery { text: Some("100%".into()), ..AuditQuery::default() };
  assert!(log.query(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn free_text_folds_non_ascii_case() {
  let log = log().await;
  log
    .append(AuditEntry {
      impact: "Überholung in Zürich".into(),
      trains: vec!["ÉX-1".into()],
      ..AuditEntry::new("Łukasz", AuditAction::Accept, "REC-1")
    })
    .await
    .unwrap();

  for needle in ["ÜBERHOLUNG", "zürich", "łukasz", "éx-1"] {
    let q = AuditQuery { text: Some(needle.into()), ..AuditQuery::default() };
    assert_eq!(log.query(&q).await.unwrap().len(), 1, "{needle}");
  }

  // Punctuation of the stored train list is not searchable.
  let q = AuditQuery { text: Some("\"]".into()), ..AuditQuery::default() };
  assert!(log.query(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn filter_by_time_range() {
  let log = seeded().await;
  let now = Utc::now();
  let q = AuditQuery {
    after: Some(now - Duration::minutes(25)),
    before: Some(now - Duration::minutes(5)),
    ..AuditQuery::default()
  };
  let actions: Vec<_> = log.query(&q).await.unwrap().into_iter().map(|e| e.action).collect();
  assert_eq!(actions, [AuditAction::Modify, AuditAction::Reject]);
}

#[tokio::test]
async fn limit_and_offset_page_results() {
  let log = seeded().await;
  let q = AuditQuery { limit: Some(2), offset: Some(1), ..AuditQuery::default() };
  let actions: Vec<_> = log.query(&q).await.unwrap().into_iter().map(|e| e.action).collect();
  assert_eq!(actions, [AuditAction::Modify, AuditAction::Reject]);

  let q = AuditQuery { offset: Some(10), ..AuditQuery::default() };
  assert!(log.query(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_and_in_memory_filters_agree() {
  let log = seeded().await;
  let all = log.query(&AuditQuery::default()).await.unwrap();
  for q in [
    AuditQuery { actor: Some("controller_001".into()), ..AuditQuery::default() },
    AuditQuery { train: Some("EX-1247".into()), ..AuditQuery::default() },
    AuditQuery { text: Some("REJECT".into()), ..AuditQuery::default() },
    AuditQuery { text: Some("WEATHER_001".into()), ..AuditQuery::default() },
    AuditQuery { text: Some("\"".into()), ..AuditQuery::default() },
  ] {
    let expected: Vec<_> = all.iter().filter(|e| q.matches(e)).map(|e| e.id).collect();
    let got: Vec<_> = log.query(&q).await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(got, expected, "{q:?}");
  }
}

#[tokio::test]
async fn reopening_a_file_keeps_entries() {
  let path = std::env::temp_dir().join(format!("signalbox-audit-{}.db", uuid::Uuid::new_v4()));
  {
    let log = SqliteAuditLog::open(&path).await.unwrap();
    log
      .append(decision("controller_001", AuditAction::Accept, &["IC-2501"], 0))
      .await
      .unwrap();
  }
  let log = SqliteAuditLog::open(&path).await.unwrap();
  assert_eq!(log.query(&AuditQuery::default()).await.unwrap().len(), 1);
  drop(log);
  let _ = std::fs::remove_file(&path);
}
