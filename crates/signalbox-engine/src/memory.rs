//! In-process audit log.

use std::convert::Infallible;

use signalbox_core::audit::{AuditEntry, AuditQuery, AuditSink};
use tokio::sync::RwLock;

/// An [`AuditSink`] that keeps entries in memory. Useful for tests and for
/// running the server without a database.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
  entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
  pub fn new() -> Self { Self::default() }

  pub async fn len(&self) -> usize { self.entries.read().await.len() }

  pub async fn is_empty(&self) -> bool { self.entries.read().await.is_empty() }

  /// Every entry in append order.
  pub async fn entries(&self) -> Vec<AuditEntry> { self.entries.read().await.clone() }
}

impl AuditSink for MemoryAuditLog {
  type Error = Infallible;

  async fn append(&self, entry: AuditEntry) -> Result<(), Infallible> {
    self.entries.write().await.push(entry);
    Ok(())
  }

  async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, Infallible> {
    let entries = self.entries.read().await;
    let mut hits: Vec<AuditEntry> = entries.iter().filter(|e| query.matches(e)).cloned().collect();
    // Latest append first among equal timestamps.
    hits.reverse();
    hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(hits
      .into_iter()
      .skip(query.offset.unwrap_or(0))
      .take(query.limit.unwrap_or(usize::MAX))
      .collect())
  }
}
