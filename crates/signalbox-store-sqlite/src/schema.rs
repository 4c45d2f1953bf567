//! SQL schema for the audit log.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Strictly append-only. The triggers below refuse UPDATE and DELETE.
CREATE TABLE IF NOT EXISTS audit_entries (
    entry_id    TEXT PRIMARY KEY,
    recorded_at TEXT NOT NULL,   -- RFC 3339 UTC, fixed width so it sorts
    actor       TEXT NOT NULL,
    action      TEXT NOT NULL,   -- AuditAction discriminant
    subject     TEXT NOT NULL,   -- recommendation, conflict or run id
    trains      TEXT NOT NULL DEFAULT '[]',   -- JSON array of train ids
    outcome     TEXT NOT NULL,   -- 'success' | 'partial' | 'failure'
    overridden  INTEGER NOT NULL DEFAULT 0,
    impact      TEXT NOT NULL DEFAULT ''
);

CREATE TRIGGER IF NOT EXISTS audit_entries_no_update
BEFORE UPDATE ON audit_entries
BEGIN
    SELECT RAISE(ABORT, 'audit entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS audit_entries_no_delete
BEFORE DELETE ON audit_entries
BEGIN
    SELECT RAISE(ABORT, 'audit entries are immutable');
END;

CREATE INDEX IF NOT EXISTS audit_recorded_idx ON audit_entries(recorded_at);
CREATE INDEX IF NOT EXISTS audit_actor_idx    ON audit_entries(actor);
CREATE INDEX IF NOT EXISTS audit_action_idx   ON audit_entries(action);

PRAGMA user_version = 1;
";
