//! [`SqliteAuditLog`], the SQLite implementation of [`AuditSink`].

use std::path::Path;

use rusqlite::{functions::FunctionFlags, types::Value};
use signalbox_core::audit::{AuditEntry, AuditQuery, AuditSink};

use crate::{
  Result,
  encode::{RawEntry, encode_dt, like_pattern},
  schema::SCHEMA,
};

/// Unicode lower-casing, matching `str::to_lowercase`. SQLite's own
/// `lower()` only folds ASCII.
const FOLD_CASE: &str = "fold_case";

const SELECT_ENTRIES: &str = "
SELECT entry_id, recorded_at, actor, action, subject, trains, outcome, overridden, impact
FROM audit_entries
WHERE 1 = 1";

/// An audit log backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteAuditLog {
  conn: tokio_rusqlite::Connection,
}

impl SqliteAuditLog {
  /// Open (or create) a log at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let log = Self { conn };
    log.init_schema().await?;
    Ok(log)
  }

  /// Open an in-memory log, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let log = Self { conn };
    log.init_schema().await?;
    Ok(log)
  }

  /// Register [`FOLD_CASE`] and run the schema DDL.
  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.create_scalar_function(
          FOLD_CASE,
          1,
          FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
          |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }
}

/// Translate `query` into a WHERE clause tail plus its bound parameters.
fn filter_clause(query: &AuditQuery) -> (String, Vec<Value>) {
  let mut sql = String::new();
  let mut params = Vec::new();
  let mut bind = |sql: &mut String, clause: &str, value: Value| {
    params.push(value);
    sql.push_str(&clause.replace('?', &format!("?{}", params.len())));
  };

  if let Some(actor) = &query.actor {
    bind(&mut sql, " AND actor = ?", Value::Text(actor.clone()));
  }
  if let Some(action) = query.action {
    bind(&mut sql, " AND action = ?", Value::Text(action.as_str().to_owned()));
  }
  if let Some(train) = &query.train {
    bind(
      &mut sql,
      " AND EXISTS (SELECT 1 FROM json_each(trains) WHERE json_each.value = ?)",
      Value::Text(train.clone()),
    );
  }
  if let Some(overridden) = query.overridden {
    bind(&mut sql, " AND overridden = ?", Value::Integer(i64::from(overridden)));
  }
  if let Some(after) = query.after {
    bind(&mut sql, " AND recorded_at >= ?", Value::Text(encode_dt(after)));
  }
  if let Some(before) = query.before {
    bind(&mut sql, " AND recorded_at <= ?", Value::Text(encode_dt(before)));
  }
  if let Some(text) = &query.text {
    bind(
      &mut sql,
      " AND (fold_case(actor) LIKE ? ESCAPE '\\' OR fold_case(subject) LIKE ? ESCAPE '\\' \
       OR fold_case(impact) LIKE ? ESCAPE '\\' OR EXISTS (SELECT 1 FROM json_each(trains) \
       WHERE fold_case(json_each.value) LIKE ? ESCAPE '\\'))",
      Value::Text(like_pattern(text)),
    );
  }

  let limit = query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
  let offset = query.offset.map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX));
  bind(&mut sql, " ORDER BY recorded_at DESC, rowid DESC LIMIT ?", Value::Integer(limit));
  bind(&mut sql, " OFFSET ?", Value::Integer(offset));
  (sql, params)
}

impl AuditSink for SqliteAuditLog {
  type Error = crate::Error;

  async fn append(&self, entry: AuditEntry) -> Result<()> {
    let raw = RawEntry::from_entry(&entry)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_entries
             (entry_id, recorded_at, actor, action, subject, trains, outcome, overridden, impact)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            raw.entry_id,
            raw.recorded_at,
            raw.actor,
            raw.action,
            raw.subject,
            raw.trains,
            raw.outcome,
            raw.overridden,
            raw.impact,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
    let (clause, params) = filter_clause(query);
    let sql = format!("{SELECT_ENTRIES}{clause}");

    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(RawEntry {
              entry_id:    row.get(0)?,
              recorded_at: row.get(1)?,
              actor:       row.get(2)?,
              action:      row.get(3)?,
              subject:     row.get(4)?,
              trains:      row.get(5)?,
              outcome:     row.get(6)?,
              overridden:  row.get(7)?,
              impact:      row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }
}
