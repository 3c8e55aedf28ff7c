//! MCS Agent - Main entry point

use mcs_agent::{spawn_signal_handler, Agent, OfflineCommsFactory};
use mcs_core::AgentSettings;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_env("MCS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration from environment
    let settings = AgentSettings::from_env();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    let agent = Agent::new(settings, Box::new(OfflineCommsFactory))?;
    agent.run(shutdown_rx).await;

    Ok(())
}
