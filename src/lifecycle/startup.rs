//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the route table and admission controller
//! - Start background tasks (admission sweeper, metrics, HTTP front end)
//! - Bind the TCP listener and serve until shutdown
//! - Give live sessions one deadline to finish before returning
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - Draining is bounded by the session deadline, so it can never hang

use std::fmt;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::listener::{parse_bind_address, Listener, ListenerError};
use crate::net::Server;
use crate::observability::metrics;
use crate::routing::{default_router, RouterError};
use crate::security::admission::AdmissionController;

/// Fatal error raised before or while serving.
#[derive(Debug)]
pub enum StartupError {
    Routes(RouterError),
    Listener(ListenerError),
    Http(std::io::Error),
    InvalidAddress { field: &'static str, value: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Routes(e) => write!(f, "Route table error: {}", e),
            StartupError::Listener(e) => write!(f, "Listener error: {}", e),
            StartupError::Http(e) => write!(f, "HTTP server error: {}", e),
            StartupError::InvalidAddress { field, value } => {
                write!(f, "Invalid address for {}: {}", field, value)
            }
        }
    }
}

impl std::error::Error for StartupError {}

impl From<RouterError> for StartupError {
    fn from(e: RouterError) -> Self {
        StartupError::Routes(e)
    }
}

impl From<ListenerError> for StartupError {
    fn from(e: ListenerError) -> Self {
        StartupError::Listener(e)
    }
}

/// Run the server until `shutdown` fires, then drain.
pub async fn run(config: ServerConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let routes = Arc::new(default_router()?);

    let admission = config
        .admission
        .enabled
        .then(|| Arc::new(AdmissionController::from_config(&config.admission)));

    if config.observability.metrics_enabled {
        let addr = parse_bind_address(&config.observability.metrics_address).map_err(|_| {
            StartupError::InvalidAddress {
                field: "observability.metrics_address",
                value: config.observability.metrics_address.clone(),
            }
        })?;
        metrics::init_metrics(addr);
    }

    let http_task = if config.http.enabled {
        let addr = parse_bind_address(&config.http.bind_address).map_err(|_| {
            StartupError::InvalidAddress {
                field: "http.bind_address",
                value: config.http.bind_address.clone(),
            }
        })?;
        let listener = TcpListener::bind(addr).await.map_err(StartupError::Http)?;
        let server = HttpServer::new(config.http.clone(), Arc::clone(&routes), admission.clone());
        let signal = shutdown.clone();
        Some(tokio::spawn(async move { server.run(listener, &signal).await }))
    } else {
        None
    };

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown.trigger();
            return Err(e.into());
        }
    };

    if let Some(admission) = &admission {
        admission.spawn_sweeper(config.admission.sweep_interval(), shutdown.subscribe());
    }

    let mut server = Server::new(routes, config.session.clone());
    if let Some(admission) = admission {
        server = server.with_admission(admission);
    }
    let tracker = server.tracker();

    let served = server.run(listener, shutdown).await;
    if served.is_err() {
        // Stop the sweeper and HTTP front end too.
        shutdown.trigger();
    }

    let drain_timeout = config.session.deadline();
    tracing::info!(
        active_sessions = tracker.active_count(),
        timeout = ?drain_timeout,
        "Draining sessions"
    );
    if !tracker.wait_for_drain(drain_timeout).await {
        tracing::warn!(
            active_sessions = tracker.active_count(),
            "Sessions still open after drain timeout"
        );
    }

    if let Some(task) = http_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
            Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            Ok(Ok(())) => {}
        }
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
