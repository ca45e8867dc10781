//! In-process relay with the same watermark semantics as the HTTP relay

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tutorcall_core::{now_millis, SessionId};
use tutorcall_media_sdk::Signal;

use super::{SignalingError, SignalingTransport};

#[derive(Default)]
struct SessionLog {
    last_timestamp: i64,
    signals: Vec<Signal>,
}

/// Shared between the negotiators of a test or demo
#[derive(Default)]
pub struct MemoryRelay {
    sessions: DashMap<SessionId, SessionLog>,
    offline: AtomicBool,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every send and fetch fails
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Everything stored for a session, oldest first
    pub fn signals(&self, session_id: &SessionId) -> Vec<Signal> {
        self.sessions
            .get(session_id)
            .map(|log| log.signals.clone())
            .unwrap_or_default()
    }

    /// Stores a signal with an explicit timestamp, bypassing the clock
    pub fn inject(&self, mut signal: Signal, timestamp: i64) {
        signal.timestamp = timestamp;
        let mut log = self.sessions.entry(signal.session_id.clone()).or_default();
        log.last_timestamp = log.last_timestamp.max(timestamp);
        log.signals.push(signal);
        log.signals.sort_by_key(|s| s.timestamp);
    }

    fn check_online(&self) -> Result<(), SignalingError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SignalingError::Unavailable("relay offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SignalingTransport for MemoryRelay {
    async fn send(&self, signal: &Signal) -> Result<(), SignalingError> {
        self.check_online()?;
        let mut log = self.sessions.entry(signal.session_id.clone()).or_default();
        let timestamp = now_millis().max(log.last_timestamp + 1);
        log.last_timestamp = timestamp;

        let mut stored = signal.clone();
        stored.timestamp = timestamp;
        log.signals.push(stored);
        Ok(())
    }

    async fn fetch(&self, session_id: &SessionId, since: i64) -> Result<Vec<Signal>, SignalingError> {
        self.check_online()?;
        Ok(self
            .sessions
            .get(session_id)
            .map(|log| {
                log.signals
                    .iter()
                    .filter(|s| s.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
