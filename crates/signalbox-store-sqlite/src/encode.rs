//! Encoding and decoding helpers between audit types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision and a
//! `Z` suffix, so lexical order matches chronological order. Train lists are
//! compact JSON arrays. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use signalbox_core::audit::{AuditAction, AuditEntry, Outcome};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_action(s: &str) -> Result<AuditAction> {
  AuditAction::parse(s).ok_or_else(|| Error::UnknownValue { column: "action", value: s.to_owned() })
}

pub fn decode_outcome(s: &str) -> Result<Outcome> {
  Outcome::parse(s).ok_or_else(|| Error::UnknownValue { column: "outcome", value: s.to_owned() })
}

/// Escape `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` pattern.
pub fn like_pattern(needle: &str) -> String {
  let mut pattern = String::with_capacity(needle.len() + 2);
  pattern.push('%');
  for c in needle.to_lowercase().chars() {
    if matches!(c, '%' | '_' | '\\') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `audit_entries` row.
pub struct RawEntry {
  pub entry_id:    String,
  pub recorded_at: String,
  pub actor:       String,
  pub action:      String,
  pub subject:     String,
  pub trains:      String,
  pub outcome:     String,
  pub overridden:  bool,
  pub impact:      String,
}

impl RawEntry {
  pub fn from_entry(entry: &AuditEntry) -> Result<Self> {
    Ok(Self {
      entry_id:    encode_uuid(entry.id),
      recorded_at: encode_dt(entry.timestamp),
      actor:       entry.actor.clone(),
      action:      entry.action.as_str().to_owned(),
      subject:     entry.subject.clone(),
      trains:      serde_json::to_string(&entry.trains)?,
      outcome:     entry.outcome.as_str().to_owned(),
      overridden:  entry.overridden,
      impact:      entry.impact.clone(),
    })
  }

  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      id:         decode_uuid(&self.entry_id)?,
      timestamp:  decode_dt(&self.recorded_at)?,
      actor:      self.actor,
      action:     decode_action(&self.action)?,
      subject:    self.subject,
      trains:     serde_json::from_str(&self.trains)?,
      outcome:    decode_outcome(&self.outcome)?,
      overridden: self.overridden,
      impact:     self.impact,
    })
  }
}
