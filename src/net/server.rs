//! TCP session server.
//!
//! # Responsibilities
//! - Drive the accept loop over a bound [`Listener`]
//! - Start one [`Session`] per accepted connection
//! - Keep the connection slot and live-session count held for the session's lifetime
//!
//! # Design Decisions
//! - Router and admission controller are shared by reference count, never copied per session
//! - A session's end is logged by the session itself; the server only releases it

use std::sync::Arc;

use crate::config::SessionConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::SessionTracker;
use crate::net::listener::{accept_loop, Connection, Listener, ListenerError};
use crate::net::session::{Session, SessionContext};
use crate::routing::Router;
use crate::security::admission::AdmissionController;

/// Serves the request/response protocol over TCP.
pub struct Server {
    context: SessionContext,
    tracker: SessionTracker,
}

impl Server {
    pub fn new(router: Arc<Router>, session: SessionConfig) -> Self {
        Self {
            context: SessionContext {
                router,
                admission: None,
                config: session,
            },
            tracker: SessionTracker::new(),
        }
    }

    /// Gate every request through `admission` before dispatch.
    pub fn with_admission(mut self, admission: Arc<AdmissionController>) -> Self {
        self.context.admission = Some(admission);
        self
    }

    /// Live-session counter, shared with every spawned session.
    pub fn tracker(&self) -> SessionTracker {
        self.tracker.clone()
    }

    /// Accept until `shutdown` fires or the listener fails fatally.
    ///
    /// Returns once the accept loop has stopped; sessions already running keep
    /// going until they end on their own or observe the same shutdown.
    pub async fn run(&self, listener: Listener, shutdown: &Shutdown) -> Result<(), ListenerError> {
        let address = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %address,
            max_connections = listener.max_connections(),
            deadline_ms = self.context.config.deadline_ms,
            admission = self.context.admission.is_some(),
            routes = ?self.context.router.route_names(),
            "Session server starting"
        );

        let context = self.context.clone();
        let tracker = self.tracker.clone();
        let session_shutdown = shutdown.clone();

        accept_loop(listener, shutdown.subscribe(), move |connection: Connection| {
            let context = context.clone();
            let guard = tracker.track();
            let shutdown_rx = session_shutdown.subscribe();

            async move {
                let Connection {
                    stream,
                    peer_addr,
                    permit,
                } = connection;

                let mut session = Session::accept(guard.id(), stream, peer_addr, &context);
                session.run(shutdown_rx).await;
                session.release().await;

                drop(permit);
                drop(guard);
            }
        })
        .await?;

        tracing::info!(
            active_sessions = self.tracker.active_count(),
            "Session server stopped accepting"
        );
        Ok(())
    }
}
