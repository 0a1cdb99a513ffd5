//! Route server.
//!
//! Accepts TCP connections, reads a stream of JSON requests from each one,
//! and answers every request with exactly one JSON response.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TCP──▶ net::listener ──▶ net::session ──▶ security::admission
//!                         │                 │                   │
//!                         │                 ▼                   ▼
//!                         │           protocol::codec ◀── routing::router
//!                         │
//!     Client ──HTTP─▶ http::server ──▶ (same admission + route table)
//!
//!     Cross-cutting: config, lifecycle (startup/shutdown/signals), observability
//! ```

use std::path::PathBuf;

use clap::Parser;

use route_server::config::load_config;
use route_server::lifecycle::{signals, startup, Shutdown};
use route_server::observability::logging;

#[derive(Parser)]
#[command(name = "route-server")]
#[command(about = "JSON request/response server over TCP", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        deadline_ms = config.session.deadline_ms,
        admission_enabled = config.admission.enabled,
        admission_limit = config.admission.limit,
        http_enabled = config.http.enabled,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    if let Err(e) = startup::run(config, &shutdown).await {
        tracing::error!(error = %e, "Server failed");
        return Err(e.into());
    }

    Ok(())
}
