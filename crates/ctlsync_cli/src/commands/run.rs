//! Run command implementation.

use ctlsync_engine::{ControllerManager, SyncConfig};
use ctlsync_protocol::ChangeEvent;
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};

/// Runs the engine until interrupted, printing each change as a JSON line.
pub async fn run(
    config: SyncConfig,
    service_types: Vec<String>,
    health_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(types = ?service_types, "tracking service types");
    let (manager, mut events) = ControllerManager::start(config, service_types)?;

    let mut health = tokio::time::interval(health_interval);
    health.tick().await;

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event)?,
                None => break,
            },
            _ = health.tick() => log_health(&manager),
            result = &mut interrupted => {
                if let Err(e) = result {
                    warn!(error = %e, "unable to listen for interrupts");
                }
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    // Keep consuming while the worker finishes its tick, or a full queue
    // would hold it up.
    let stopping = manager.shutdown();
    tokio::pin!(stopping);
    loop {
        tokio::select! {
            biased;
            _ = &mut stopping => break,
            event = events.recv() => match event {
                Some(event) => print_event(&event)?,
                None => {
                    (&mut stopping).await;
                    break;
                }
            },
        }
    }
    for event in events.drain_ready() {
        print_event(&event)?;
    }

    Ok(())
}

fn log_health(manager: &ControllerManager) {
    let stats = manager.stats();
    match manager.check() {
        Ok(()) => info!(
            services = stats.services_tracked,
            cycles = stats.cycles_completed,
            "controller sync healthy"
        ),
        Err(e) => warn!(error = %e, failed_cycles = stats.cycles_failed, "controller sync unhealthy"),
    }
}

fn print_event(event: &ChangeEvent) -> Result<(), Box<dyn std::error::Error>> {
    let line = format_event(event)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

fn format_event(event: &ChangeEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
