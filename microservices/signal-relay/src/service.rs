//! Service lifecycle for the relay

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::info;
use tutorcall_core::{Result, ShutdownSignal, TutorCallService};

use crate::{create_router, AppState, RelayConfig};

pub struct RelayService {
    state: AppState,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves on an already bound listener; returns once in-flight requests finished
    pub async fn serve_on(&self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<()> {
        axum::serve(listener, create_router(self.state.clone()))
            .with_graceful_shutdown(shutdown.recv())
            .await?;
        info!(
            sessions = self.state.store.session_count(),
            signals = self.state.metrics.signals_stored.get(),
            "Signal relay drained"
        );
        Ok(())
    }
}

#[async_trait]
impl TutorCallService for RelayService {
    fn service_id(&self) -> &'static str {
        "signal-relay"
    }

    async fn serve(&self, shutdown: ShutdownSignal) -> Result<()> {
        let bind_addr = self.state.config.bind_address()?;
        let listener = TcpListener::bind(bind_addr).await?;
        info!(bind = %bind_addr, "Signal relay listening");
        self.serve_on(listener, shutdown).await
    }
}
