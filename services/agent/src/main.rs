//! iot-agent
//!
//! Keeps the containers of an IoT host in line with a declared document.
//!
//! ## Architecture
//!
//! - **Config Source**: Loads the desired-state document from a file or URL
//! - **Agent Loop**: Reloads the document and runs a pass every poll interval
//! - **Reconciler**: Creates volumes, networks and containers that are missing
//! - **Runtime**: Docker Engine API over the daemon's Unix socket

use std::sync::Arc;

use anyhow::Result;
use iot_agent::{Agent, Config, ConfigSource, DockerClient, LogFormat};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info", LogFormat::default());
            error!(error = ?e, "Invalid configuration");
            return Err(e);
        }
    };

    init_tracing(&config.log_level, config.log_format);
    info!("Starting iot-agent");
    info!(
        source = %config.source,
        docker_socket = %config.docker_socket.display(),
        docker_api_version = %config.docker_api_version,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Configuration loaded"
    );

    let docker = DockerClient::new(&config.docker_socket, config.docker_api_version.clone());
    if !docker.socket_exists() {
        warn!(
            docker_socket = %config.docker_socket.display(),
            "Docker socket not found, passes will fail until it appears"
        );
    }

    let source = ConfigSource::new(config.source.clone())?;
    let mut agent = match Agent::bootstrap(source, Arc::new(docker), &config).await {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = ?e, "Startup failed");
            return Err(e);
        }
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut agent_handle = tokio::spawn(async move {
        agent.run(shutdown_rx).await;
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
        result = &mut agent_handle => {
            if let Err(e) = result {
                error!(error = %e, "Agent task panicked");
            }
        }
    }

    // Signal shutdown and let an in-flight pass finish
    let _ = shutdown_tx.send(true);
    if !agent_handle.is_finished() {
        info!("Waiting for the current pass to finish...");
        let _ = agent_handle.await;
    }

    info!("iot-agent shutdown complete");
    Ok(())
}
