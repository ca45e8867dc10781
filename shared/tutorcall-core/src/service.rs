//! Service lifecycle: start, wait for a stop request, drain, exit

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, TutorCallError};

/// Fires once when the runtime wants the service to stop accepting work.
///
/// Cloneable; every clone observes the same request. A dropped trigger
/// counts as a stop request.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Sending half of a [`ShutdownSignal`]
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, ShutdownSignal { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop was requested
    pub async fn recv(mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// A long-running TutorCall process
#[async_trait]
pub trait TutorCallService: Send + Sync + 'static {
    /// Service identifier (e.g., "signal-relay")
    fn service_id(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Serves until `shutdown` fires, then finishes in-flight work and returns
    async fn serve(&self, shutdown: ShutdownSignal) -> Result<()>;
}

pub struct MicroserviceRuntime {
    config: ServiceConfig,
    start_time: Instant,
}

impl MicroserviceRuntime {
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(ServiceConfig::from_env()?))
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Runs `service` until Ctrl-C or SIGTERM
    pub async fn run<S: TutorCallService>(service: Arc<S>) -> Result<()> {
        let runtime = Self::new()?;
        runtime.run_until(service, wait_for_os_signal()).await
    }

    /// Runs `service` until `stop` resolves, then gives it
    /// `shutdown_timeout` to drain before aborting it.
    pub async fn run_until<S, F>(&self, service: Arc<S>, stop: F) -> Result<()>
    where
        S: TutorCallService,
        F: Future<Output = ()> + Send,
    {
        info!(
            service_id = service.service_id(),
            version = service.version(),
            configured_name = %self.config.service_name,
            "Starting service"
        );

        let (trigger, shutdown) = ShutdownSignal::channel();
        let serving = service.clone();
        let mut task = tokio::spawn(async move { serving.serve(shutdown).await });

        tokio::select! {
            outcome = &mut task => {
                let result = join_outcome(outcome);
                if let Err(e) = &result {
                    error!(service_id = service.service_id(), error = %e, "Service exited unexpectedly");
                }
                return result;
            }
            _ = stop => {}
        }

        info!(
            drain_timeout_secs = self.config.shutdown_timeout.as_secs(),
            "Shutdown requested, draining in-flight work"
        );
        trigger.trigger();

        match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
            Ok(outcome) => join_outcome(outcome)?,
            Err(_) => {
                warn!(service_id = service.service_id(), "Drain timed out, aborting service task");
                task.abort();
            }
        }

        info!(
            uptime_seconds = self.start_time.elapsed().as_secs(),
            "Service stopped"
        );
        Ok(())
    }
}

fn join_outcome(outcome: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    outcome.map_err(|e| TutorCallError::Internal(format!("service task failed: {}", e)))?
}

async fn wait_for_os_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Draining {
        drain_for: Duration,
        drained: AtomicBool,
    }

    #[async_trait]
    impl TutorCallService for Draining {
        fn service_id(&self) -> &'static str {
            "draining"
        }

        async fn serve(&self, shutdown: ShutdownSignal) -> Result<()> {
            shutdown.recv().await;
            tokio::time::sleep(self.drain_for).await;
            self.drained.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn runtime(shutdown_timeout: Duration) -> MicroserviceRuntime {
        MicroserviceRuntime::with_config(ServiceConfig {
            service_name: "test".to_string(),
            http_port: 0,
            log_level: "info".to_string(),
            json_logs: false,
            shutdown_timeout,
        })
    }

    #[tokio::test]
    async fn test_stop_waits_for_drain() {
        let service = Arc::new(Draining {
            drain_for: Duration::from_millis(50),
            drained: AtomicBool::new(false),
        });
        let stop = tokio::time::sleep(Duration::from_millis(10));

        runtime(Duration::from_secs(5)).run_until(service.clone(), stop).await.unwrap();
        assert!(service.drained.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drain_timeout_aborts() {
        let service = Arc::new(Draining {
            drain_for: Duration::from_secs(60),
            drained: AtomicBool::new(false),
        });
        let stop = tokio::time::sleep(Duration::from_millis(10));

        let started = Instant::now();
        runtime(Duration::from_millis(50)).run_until(service.clone(), stop).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!service.drained.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_stop() {
        let (trigger, shutdown) = ShutdownSignal::channel();
        assert!(!shutdown.is_triggered());
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), shutdown.recv()).await.unwrap();
    }
}
