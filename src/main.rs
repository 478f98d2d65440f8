//! Service gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client
//!     │
//!     ▼
//!   rate limit ──▶ handlers ──▶ ReplicaRouter + breaker pool ──▶ replica 1..n
//!                     │
//!                     ├──▶ NotificationDispatcher (detached) ──▶ notification-service
//!                     │
//!                     └──▶ DiscoveryClient ──▶ service-discovery
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::config::load_gateway_config;
use service_gateway::http::GatewayServer;
use service_gateway::lifecycle::{signals, Shutdown};
use service_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "service-gateway")]
#[command(about = "Resilient API gateway", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults are used when absent
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_gateway_config(args.config.as_deref())?;

    logging::init_logging(&config.observability, "service_gateway");
    tracing::info!("service-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        discovery = %config.discovery.url,
        upstream = %config.upstream.service,
        static_replicas = config.replicas_for(&config.upstream.service).len(),
        failure_threshold = config.circuit_breaker.failure_threshold,
        reset_timeout_ms = config.circuit_breaker.reset_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    GatewayServer::new(config)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
