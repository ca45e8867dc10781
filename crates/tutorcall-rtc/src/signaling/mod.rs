//! Signaling transport: the relay contract, its HTTP and in-memory
//! implementations, and the polling loop that feeds a negotiator.

mod http;
mod memory;
mod poller;

use async_trait::async_trait;
use tutorcall_core::SessionId;
use tutorcall_media_sdk::Signal;

pub use http::HttpSignalingClient;
pub use memory::MemoryRelay;
pub use poller::{PollerSettings, SignalHandler, SignalPoller};

/// A dumb relay of signals keyed by session id
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Posts one signal; the relay assigns its timestamp
    async fn send(&self, signal: &Signal) -> Result<(), SignalingError>;

    /// Signals of `session_id` with `timestamp > since`, oldest first
    async fn fetch(&self, session_id: &SessionId, since: i64) -> Result<Vec<Signal>, SignalingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relay returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Relay unavailable: {0}")]
    Unavailable(String),
}
