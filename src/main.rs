//! Edge gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌────────────────────────────────────────────────────┐
//!                   │                   EDGE GATEWAY                     │
//!                   │                                                    │
//!  Client Request   │  ┌────────┐   ┌──────────┐   ┌────────────────┐    │
//!  ─────────────────┼─▶│ http   │──▶│ pipeline │──▶│ load_balancer  │────┼──▶ Destination
//!                   │  │ server │   │ admission│   │  round robin   │    │
//!                   │  └────────┘   └────┬─────┘   └────────────────┘    │
//!                   │                    │ reads snapshots of             │
//!                   │   ┌────────┬───────┴──┬──────────┬─────────┐      │
//!                   │   │routing │ policy   │ security │  cache  │      │
//!                   │   └────────┴──────────┴──────────┴─────────┘      │
//!                   │                    ▲ swapped by                   │
//!  Operator         │              ┌─────┴─────┐                        │
//!  ─────────────────┼─────────────▶│   admin   │                        │
//!                   │              └───────────┘                        │
//!                   └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use edge_gateway::config::loader::load_config;
use edge_gateway::config::watcher::{apply_route_reloads, ConfigWatcher};
use edge_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use edge_gateway::observability::init_logging;
use edge_gateway::{GatewayServer, GatewayState};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Multi-tenant edge gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,

    /// Do not reload routes when the configuration file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        clusters = config.clusters.len(),
        "edge-gateway starting"
    );

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let state = Arc::new(GatewayState::build(config, shutdown.token()).await?);

    // Keep the watcher alive for the life of the process.
    let _watcher = if args.no_watch {
        None
    } else {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        tokio::spawn(apply_route_reloads(
            updates,
            state.routes.clone(),
            shutdown.subscribe(),
        ));
        match watcher.run() {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!(error = %e, "config watcher unavailable, hot reload disabled");
                None
            }
        }
    };

    GatewayServer::new(state).run(shutdown).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
