//! Signal Relay
//!
//! Dumb relay for tutoring calls:
//! - Session metadata (create, read with the caller's role, status updates)
//! - Signaling mailbox partitioned by session id, timestamped by the relay
//!
//! Everything lives in memory; restarting the relay drops all sessions.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod store;

use std::sync::Arc;
use std::time::Instant;

use tutorcall_telemetry::{Counter, Gauge};

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use routes::create_router;
pub use service::RelayService;
pub use store::RelayStore;

#[derive(Clone)]
pub struct RelayMetrics {
    pub signals_stored: Counter,
    pub sessions: Gauge,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            signals_stored: Counter::new("relay_signals_stored"),
            sessions: Gauge::new("relay_sessions"),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RelayStore>,
    pub config: Arc<RelayConfig>,
    pub metrics: RelayMetrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            store: Arc::new(RelayStore::new(config.max_signals_per_session)),
            config: Arc::new(config),
            metrics: RelayMetrics::new(),
            start_time: Instant::now(),
        }
    }
}
