//! Lynk gateway daemon - presence registry and realtime relay
//!
//! This binary runs the realtime gateway: it accepts client socket
//! connections, tracks who is online, routes direct messages, relays call
//! signaling, and dispatches notifications.
//!
//! # Usage
//!
//! ```bash
//! # Start the gateway (foreground)
//! lynkd serve
//!
//! # Start on a specific address
//! lynkd serve --bind 0.0.0.0:7420
//!
//! # Address via environment
//! LYNKD_BIND=0.0.0.0:7420 lynkd serve
//!
//! # Enable debug logging
//! RUST_LOG=lynkd=debug lynkd serve
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM/SIGINT trigger a graceful shutdown: the accept loop stops, the
//! presence fan-out drains, and the process exits.

use std::env;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lynkd::registry::spawn_registry;
use lynkd::server::{GatewayServer, DEFAULT_BIND_ADDR};
use lynkd::store::GatewayStores;

/// Lynk gateway daemon - realtime presence and message relay
#[derive(Parser, Debug)]
#[command(name = "lynkd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway
    Serve {
        /// Address to listen on (overrides LYNKD_BIND)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default to 'serve' if no subcommand given
    let command = args.command.unwrap_or(Command::Serve { bind: None });

    match command {
        Command::Serve { bind } => {
            let bind = bind
                .or_else(|| env::var("LYNKD_BIND").ok())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
            run_gateway(bind)
        }
    }
}

/// Runs the gateway (async entry point).
#[tokio::main]
async fn run_gateway(bind: String) -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lynkd=info".parse()?)
                .add_directive("lynk_core=info".parse()?)
                .add_directive("lynk_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Lynk gateway starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Spawn the presence registry
    let registry = spawn_registry();
    info!("Presence registry started");

    // In-process stores; durable backends plug in through the same traits.
    let stores = GatewayStores::in_memory();

    // Bind and run the server
    let server = GatewayServer::bind(&bind, registry, stores, cancel_token).await?;

    info!(addr = %bind, "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Lynk gateway stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
