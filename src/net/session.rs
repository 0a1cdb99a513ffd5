//! Per-connection session.
//!
//! # Responsibilities
//! - Own exactly one accepted connection
//! - Run decode → admit → dispatch → encode until the deadline, a transport
//!   failure, or server shutdown
//! - Release the connection exactly once
//!
//! # State Machine
//! ```text
//! Accepted ──run()──▶ Active ──deadline──▶ TimedOut
//!                        │──shutdown─────▶ Closed
//!                        └──eof/decode/write error──▶ Failed
//! ```
//!
//! # Design Decisions
//! - The deadline is a ceiling on total lifetime, not a per-read timeout
//! - The serve loop races the deadline as a whole; the loser is dropped, which
//!   aborts a read stuck waiting on a silent client
//! - Requests on one connection are answered strictly in arrival order
//! - Only transport failures close the connection without a Response

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::lifecycle::shutdown::signalled;
use crate::net::connection::SessionId;
use crate::observability::metrics;
use crate::protocol::{CodecError, JsonCodec, Request, Response};
use crate::routing::Router;
use crate::security::admission::AdmissionController;

/// Body of the failure Response sent to clients over their admission limit.
pub const REJECTED_MESSAGE: &str = "too many requests";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Active,
    TimedOut,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::TimedOut | SessionState::Closed | SessionState::Failed
        )
    }
}

/// Transport failure that ends a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client closed the connection")]
    EndOfStream,

    #[error("decode failed: {0}")]
    Decode(#[source] CodecError),

    #[error("write failed: {0}")]
    Write(#[source] CodecError),
}

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    TimedOut,
    Closed,
    Failed(SessionError),
}

impl SessionEnd {
    pub fn state(&self) -> SessionState {
        match self {
            SessionEnd::TimedOut => SessionState::TimedOut,
            SessionEnd::Closed => SessionState::Closed,
            SessionEnd::Failed(_) => SessionState::Failed,
        }
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionEnd::TimedOut => "timed_out",
            SessionEnd::Closed => "closed",
            SessionEnd::Failed(SessionError::EndOfStream) => "end_of_stream",
            SessionEnd::Failed(SessionError::Decode(_)) => "decode_error",
            SessionEnd::Failed(SessionError::Write(_)) => "write_error",
        }
    }
}

/// Everything a session needs besides its socket. Cheap to clone.
#[derive(Clone)]
pub struct SessionContext {
    pub router: Arc<Router>,
    pub admission: Option<Arc<AdmissionController>>,
    pub config: SessionConfig,
}

/// One accepted connection with a bounded lifetime.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    identity: String,
    stream: Option<TcpStream>,
    codec: JsonCodec,
    deadline: Instant,
    state: SessionState,
    served: u64,
    router: Arc<Router>,
    admission: Option<Arc<AdmissionController>>,
}

impl Session {
    /// Take ownership of a freshly accepted stream and arm the deadline.
    pub fn accept(id: SessionId, stream: TcpStream, peer: SocketAddr, ctx: &SessionContext) -> Self {
        Self {
            id,
            peer,
            identity: peer.ip().to_string(),
            stream: Some(stream),
            codec: JsonCodec::new(ctx.config.max_frame_bytes),
            deadline: Instant::now() + ctx.config.deadline(),
            state: SessionState::Accepted,
            served: 0,
            router: Arc::clone(&ctx.router),
            admission: ctx.admission.clone(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Requests answered so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Serve requests until the deadline, shutdown, or a transport failure.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> SessionEnd {
        self.state = SessionState::Active;
        tracing::info!(session_id = %self.id, peer = %self.peer, "Client connected");

        let deadline = self.deadline;
        let end = tokio::select! {
            err = self.serve() => SessionEnd::Failed(err),
            _ = time::sleep_until(deadline) => SessionEnd::TimedOut,
            _ = signalled(&mut shutdown) => SessionEnd::Closed,
        };

        self.state = end.state();
        metrics::record_session_end(end.reason());
        match &end {
            SessionEnd::Failed(SessionError::Decode(e)) => {
                tracing::warn!(
                    session_id = %self.id,
                    peer = %self.peer,
                    error = %e,
                    served = self.served,
                    "Session failed"
                );
            }
            SessionEnd::Failed(SessionError::Write(e)) => {
                tracing::warn!(
                    session_id = %self.id,
                    peer = %self.peer,
                    error = %e,
                    served = self.served,
                    "Session failed"
                );
            }
            other => {
                tracing::info!(
                    session_id = %self.id,
                    peer = %self.peer,
                    reason = other.reason(),
                    served = self.served,
                    "Session ended"
                );
            }
        }
        end
    }

    /// Shut the connection down. Only the first call does anything.
    pub async fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                if let Err(e) = stream.shutdown().await {
                    tracing::debug!(session_id = %self.id, error = %e, "Socket shutdown failed");
                }
                tracing::debug!(session_id = %self.id, "Connection released");
                true
            }
            None => false,
        }
    }

    /// The decode → dispatch → encode loop. Only returns on failure.
    async fn serve(&mut self) -> SessionError {
        let Some(stream) = self.stream.as_mut() else {
            return SessionError::EndOfStream;
        };

        loop {
            let request: Request = match self.codec.decode(stream).await {
                Ok(Some(request)) => request,
                Ok(None) => return SessionError::EndOfStream,
                Err(e) => return SessionError::Decode(e),
            };

            let response = respond(
                &self.router,
                self.admission.as_deref(),
                &self.identity,
                self.id,
                &request,
            );

            if let Err(e) = JsonCodec::encode(stream, &response).await {
                return SessionError::Write(e);
            }
            self.served += 1;
        }
    }
}

/// Admission check, then dispatch. Always produces a Response.
fn respond(
    router: &Router,
    admission: Option<&AdmissionController>,
    identity: &str,
    session_id: SessionId,
    request: &Request,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::debug_span!(
        "request",
        session_id = %session_id,
        request_id = %request_id,
        route = %request.route
    );
    let _entered = span.enter();

    if let Some(admission) = admission {
        if !admission.admit(identity).is_allowed() {
            return Response::failure(REJECTED_MESSAGE);
        }
    }

    let response = router.dispatch(request);
    tracing::debug!(status = response.status(), "Request handled");
    response
}
