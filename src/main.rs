//! dev-gateway
//!
//! Local development gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────┐
//!                          │                 DEV GATEWAY                  │
//!     Client Request       │  ┌─────────┐    ┌─────────┐    ┌──────────┐  │
//!     ─────────────────────┼─▶│   net   │───▶│  http   │───▶│ routing  │  │
//!                          │  │listener │    │dispatch │    │  table   │  │
//!                          │  └─────────┘    └─────────┘    └────┬─────┘  │
//!                          │                                     │        │
//!                          │                    ┌────────────────┴─────┐  │
//!                          │                    ▼                      ▼  │
//!                          │             ┌────────────┐      ┌───────────┐│
//!     Client Response      │             │  forward   │      │  upgraded ││
//!     ◀────────────────────┼─────────────│  (hyper)   │      │  channel  ││◀──── Backend
//!                          │             └────────────┘      └───────────┘│
//!                          │                                              │
//!                          │  config · observability · lifecycle          │
//!                          └──────────────────────────────────────────────┘
//! ```
//!
//! Exit status is 0 after a clean shutdown and non-zero when configuration,
//! binding, or serving fails.

use clap::Parser;
use std::path::PathBuf;

use dev_gateway::config::{load_config, EnvOverrides};
use dev_gateway::lifecycle::signals::shutdown_signal;
use dev_gateway::observability::{logging, metrics};
use dev_gateway::Gateway;

#[derive(Parser)]
#[command(name = "dev-gateway")]
#[command(about = "Development HTTP/WebSocket routing gateway", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Backend port used by the default /api and /ws routes
    #[arg(long, env = "PROXY_PORT")]
    proxy_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = EnvOverrides {
        port: cli.port,
        proxy_port: cli.proxy_port,
    };

    let config = match load_config(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    logging::init(&config.observability.log_level);

    tracing::info!("dev-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        listen = %format!("{}:{}", config.listener.host, config.listener.port),
        routes = config.routes.len(),
        connect_timeout_secs = config.upstream.connect_timeout_secs,
        upgrade_idle_secs = config.upstream.upgrade_idle_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let running = match Gateway::from_config(&config) {
        Ok(gateway) => gateway.start().await,
        Err(e) => Err(e),
    };
    let running = running.map_err(|e| {
        tracing::error!(error = %dev_gateway::error::error_chain(&e), "Gateway failed to start");
        e
    })?;

    shutdown_signal().await;
    running.shutdown().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
