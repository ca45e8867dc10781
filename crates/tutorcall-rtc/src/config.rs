//! Negotiator configuration

use std::collections::HashSet;
use std::time::Duration;

use tutorcall_core::{Result, TutorCallError};
use tutorcall_media_sdk::RtcConfiguration;

/// Settings for one negotiator instance and its signaling client
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Base URL of the signaling relay and session store
    pub signal_base_url: String,
    /// How often the relay is polled for new signals
    pub poll_interval: Duration,
    /// Wait between local media becoming ready and the offerer sending its offer
    pub offer_delay: Duration,
    /// STUN/TURN URLs handed to every peer connection
    pub ice_servers: Vec<String>,
    /// Per-request timeout of the HTTP clients
    pub request_timeout: Duration,
    /// Consecutive failures after which a signal is skipped
    pub max_signal_attempts: u32,
    /// Watermark the poller starts from
    pub initial_watermark: i64,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            signal_base_url: "http://localhost:3000".to_string(),
            poll_interval: Duration::from_secs(1),
            offer_delay: Duration::from_secs(2),
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            request_timeout: Duration::from_secs(10),
            max_signal_attempts: 3,
            initial_watermark: 0,
        }
    }
}

impl NegotiatorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            signal_base_url: std::env::var("SIGNAL_BASE_URL")
                .unwrap_or(defaults.signal_base_url),
            poll_interval: millis_var("SIGNAL_POLL_INTERVAL_MS", defaults.poll_interval)?,
            offer_delay: millis_var("OFFER_DELAY_MS", defaults.offer_delay)?,
            ice_servers: std::env::var("STUN_SERVERS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.ice_servers),
            request_timeout: millis_var("SIGNAL_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            max_signal_attempts: std::env::var("MAX_SIGNAL_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|e| TutorCallError::Config(format!("Invalid MAX_SIGNAL_ATTEMPTS: {}", e)))?,
            initial_watermark: 0,
        };
        config.validate()?;
        Ok(config)
    }

    /// NAT traversal needs at least two independent STUN servers
    pub fn validate(&self) -> Result<()> {
        let distinct: HashSet<&str> = self.ice_servers.iter().map(String::as_str).collect();
        if distinct.len() < 2 {
            return Err(TutorCallError::Config(format!(
                "at least two distinct ICE servers are required, got {}",
                distinct.len()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(TutorCallError::Config("poll interval must be non-zero".to_string()));
        }
        if self.max_signal_attempts == 0 {
            return Err(TutorCallError::Config("MAX_SIGNAL_ATTEMPTS must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn rtc_configuration(&self) -> RtcConfiguration {
        RtcConfiguration::from_urls(self.ice_servers.iter().cloned())
    }
}

fn millis_var(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| TutorCallError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
