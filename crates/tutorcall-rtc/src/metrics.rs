//! Per-negotiator counters

use tutorcall_telemetry::{Counter, Histogram};

/// Counters for one negotiator; clones share the underlying values
#[derive(Clone)]
pub struct NegotiatorMetrics {
    pub signals_sent: Counter,
    pub signals_failed: Counter,
    pub signals_skipped: Counter,
    pub poll_failures: Counter,
    pub offers_sent: Counter,
    pub candidates_buffered: Counter,
    pub candidates_flushed: Counter,
    /// Offer sent to answer applied, in milliseconds
    pub negotiation_ms: Histogram,
}

impl NegotiatorMetrics {
    pub fn new() -> Self {
        Self {
            signals_sent: Counter::new("signals_sent"),
            signals_failed: Counter::new("signals_failed"),
            signals_skipped: Counter::new("signals_skipped"),
            poll_failures: Counter::new("signal_poll_failures"),
            offers_sent: Counter::new("offers_sent"),
            candidates_buffered: Counter::new("ice_candidates_buffered"),
            candidates_flushed: Counter::new("ice_candidates_flushed"),
            negotiation_ms: Histogram::new("negotiation_ms"),
        }
    }
}

impl Default for NegotiatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
