use anyhow::Result;
use combined_energy::coordinator::RefreshOutcome;
use combined_energy::logging::init_logging;
use combined_energy::{Config, Orchestrator};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Combined Energy client {} starting up",
        env!("CARGO_PKG_VERSION")
    );

    let mut orchestrator = Orchestrator::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create orchestrator: {}", e))?;

    // Bad credentials will not fix themselves; anything else is retried by the pollers
    match orchestrator.client().login().await {
        Ok(_) => info!("Login succeeded"),
        Err(e) if e.is_auth() => {
            error!("Login rejected: {}", e);
            return Err(anyhow::anyhow!("Authentication failed: {}", e));
        }
        Err(e) => warn!("Login failed, continuing: {}", e),
    }

    let mut events = orchestrator.subscribe_events();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match &event.outcome {
                    RefreshOutcome::Success => {
                        debug!("{} refreshed at {}", event.coordinator, event.at)
                    }
                    RefreshOutcome::Failed(e) => {
                        debug!("{} refresh failed at {}: {}", event.coordinator, event.at, e)
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} refresh events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let report = orchestrator.first_refresh().await;
    if !report.all_ok() {
        warn!(
            "{} of 3 coordinators failed their first refresh",
            report.failures().len()
        );
    }

    orchestrator.start();

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    orchestrator.shutdown().await;
    event_task.abort();
    info!("Shutdown complete");
    Ok(())
}
