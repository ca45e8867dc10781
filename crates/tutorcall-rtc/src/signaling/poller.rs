//! Periodic relay fetch feeding a [`SignalHandler`]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tutorcall_core::{PeerId, SessionId};
use tutorcall_media_sdk::Signal;

use super::SignalingTransport;
use crate::error::NegotiatorError;
use crate::metrics::NegotiatorMetrics;

/// Receives remote signals in arrival order
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle_signal(&self, signal: Signal) -> Result<(), NegotiatorError>;
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    pub initial_watermark: i64,
}

/// Background task polling the relay for one session.
///
/// The watermark only moves past a signal once the handler accepted it.
/// Aborted on [`stop`](Self::stop) or drop.
pub struct SignalPoller {
    handle: JoinHandle<()>,
    watermark: Arc<AtomicI64>,
}

impl SignalPoller {
    pub fn spawn(
        session_id: SessionId,
        own_id: PeerId,
        transport: Arc<dyn SignalingTransport>,
        handler: Weak<dyn SignalHandler>,
        settings: PollerSettings,
        metrics: NegotiatorMetrics,
    ) -> Self {
        let watermark = Arc::new(AtomicI64::new(settings.initial_watermark));
        let task = PollLoop {
            session_id,
            own_id,
            transport,
            handler,
            max_attempts: settings.max_attempts.max(1),
            watermark: watermark.clone(),
            metrics,
            failing: None,
        };
        let handle = tokio::spawn(task.run(settings.interval));
        Self { handle, watermark }
    }

    pub fn watermark(&self) -> i64 {
        self.watermark.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SignalPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct PollLoop {
    session_id: SessionId,
    own_id: PeerId,
    transport: Arc<dyn SignalingTransport>,
    handler: Weak<dyn SignalHandler>,
    max_attempts: u32,
    watermark: Arc<AtomicI64>,
    metrics: NegotiatorMetrics,
    /// Timestamp of the signal currently failing and its attempt count
    failing: Option<(i64, u32)>,
}

impl PollLoop {
    async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(handler) = self.handler.upgrade() else {
                debug!(session_id = %self.session_id, "Signal handler gone, stopping poller");
                break;
            };
            self.tick(handler.as_ref()).await;
        }
    }

    async fn tick(&mut self, handler: &dyn SignalHandler) {
        let since = self.watermark.load(Ordering::SeqCst);
        let signals = match self.transport.fetch(&self.session_id, since).await {
            Ok(signals) => signals,
            Err(e) => {
                self.metrics.poll_failures.inc();
                warn!(session_id = %self.session_id, error = %e, "Signal poll failed");
                return;
            }
        };

        for signal in signals {
            let timestamp = signal.timestamp;
            if timestamp <= self.watermark.load(Ordering::SeqCst) {
                continue;
            }
            if signal.sender_id == self.own_id {
                self.advance(timestamp);
                continue;
            }

            let kind = signal.kind();
            match handler.handle_signal(signal).await {
                Ok(()) => {
                    self.failing = None;
                    self.advance(timestamp);
                }
                Err(e) => {
                    let attempts = match self.failing {
                        Some((ts, n)) if ts == timestamp => n + 1,
                        _ => 1,
                    };
                    if attempts >= self.max_attempts {
                        self.metrics.signals_skipped.inc();
                        warn!(
                            session_id = %self.session_id,
                            kind,
                            timestamp,
                            attempts,
                            error = %e,
                            "Giving up on signal"
                        );
                        self.failing = None;
                        self.advance(timestamp);
                        continue;
                    }
                    info!(
                        session_id = %self.session_id,
                        kind,
                        timestamp,
                        attempts,
                        error = %e,
                        "Signal processing failed, retrying next tick"
                    );
                    self.failing = Some((timestamp, attempts));
                    break;
                }
            }
        }
    }

    fn advance(&self, timestamp: i64) {
        self.watermark.fetch_max(timestamp, Ordering::SeqCst);
    }
}
