//! Configuration for the signal relay

use std::net::SocketAddr;

use tutorcall_core::{Result, TutorCallError};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Oldest signals are dropped beyond this many per session
    pub max_signals_per_session: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_signals_per_session: 1000,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| TutorCallError::Config(format!("Invalid PORT: {}", e)))?,
            max_signals_per_session: std::env::var("MAX_SIGNALS_PER_SESSION")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|e| TutorCallError::Config(format!("Invalid MAX_SIGNALS_PER_SESSION: {}", e)))?,
        })
    }

    /// Get socket address for binding
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| TutorCallError::Config(format!("Invalid bind address: {}", e)))
    }
}
