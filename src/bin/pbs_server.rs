//! Process entry point. Reads environment configuration, wires an
//! [`pbs::orchestrator::Instance`], and runs it to completion. Exit codes
//! follow spec §6: `0` clean shutdown, `1` init failure, `2` run failure.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use pbs::config::Config;
use pbs::orchestrator::Instance;

#[tokio::main]
async fn main() -> ExitCode {
    pbs::logging::init(std::env::var("PBS_LOG_CONFIG").ok().as_deref());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::from(1);
        }
    };

    let instance = Arc::new(Instance::new(config));
    if let Err(e) = instance.init() {
        error!("instance init failed: {e:#}");
        return ExitCode::from(1);
    }

    let stopper = instance.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        stopper.stop();
    });

    match instance.run().await {
        Ok(()) => {
            info!("pbs_server exited cleanly");
            ExitCode::from(0)
        }
        Err(e) => {
            error!("instance run failed: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Waits for SIGINT or SIGTERM (spec §6: "No signal-driven behavior beyond
/// SIGINT/SIGTERM triggering `Stop`").
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
