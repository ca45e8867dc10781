//! Signal Relay Microservice

use std::sync::Arc;

use signal_relay::{RelayConfig, RelayService};
use tracing::info;
use tutorcall_core::MicroserviceRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = tutorcall_telemetry::init("signal-relay")?;

    info!("Starting Signal Relay microservice");

    let config = RelayConfig::from_env()?;
    let service = Arc::new(RelayService::new(config));
    MicroserviceRuntime::run(service).await?;

    Ok(())
}
