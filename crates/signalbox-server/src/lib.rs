//! Wiring for the `signalbox` server binary.
//!
//! Holds the deserialised [`ServerConfig`] and builds the HTTP application
//! around a [`Dispatcher`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use serde::Deserialize;
use signalbox_core::{audit::AuditSink, config::EngineConfig};
use signalbox_engine::Dispatcher;
use tower_http::trace::TraceLayer;

/// Audit path that selects an in-memory database instead of a file.
pub const IN_MEMORY: &str = ":memory:";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `signalbox.toml` and
/// `SIGNALBOX_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  /// SQLite file for the audit log, or `:memory:`.
  pub audit_path: PathBuf,
  pub engine:     EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      audit_path: PathBuf::from("signalbox-audit.db"),
      engine:     EngineConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Layer `SIGNALBOX_*` variables from `env` over the optional TOML file at
  /// `path`.
  pub fn load(path: &Path, env: config::Environment) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env)
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn in_memory_audit(&self) -> bool { self.audit_path.as_os_str() == IN_MEMORY }
}

/// The process environment source: `SIGNALBOX_PORT`, and nested keys split on
/// a double underscore such as `SIGNALBOX_ENGINE__SIMULATION__STEPS`.
pub fn environment() -> config::Environment {
  config::Environment::with_prefix("SIGNALBOX")
    .prefix_separator("_")
    .separator("__")
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router nested under `/api`, with request tracing.
pub fn app<A>(dispatcher: Arc<Dispatcher<A>>) -> Router
where
  A: AuditSink + 'static,
{
  Router::new()
    .nest("/api", signalbox_api::api_router(dispatcher))
    .layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
