//! TCP listener and accept loop with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Keep accepting through transient errors, stop on fatal ones
//!
//! # Design Decisions
//! - The accept loop never awaits a connection handler (spawn and move on)
//! - A permit is taken before accept, so a full server stops pulling from the backlog
//! - `:8080` is shorthand for all interfaces

use std::future::Future;
use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};

use crate::config::ListenerConfig;
use crate::lifecycle::shutdown::signalled;
use crate::observability::metrics;

/// Pause after running out of file descriptors or memory before accepting again.
const RESOURCE_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(io::Error),
    /// Failed to accept connection.
    Accept(io::Error),
    /// The listener can no longer hand out connections.
    Closed,
}

impl ListenerError {
    /// Whether the accept loop may keep going after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            ListenerError::Accept(e) => is_transient_accept_error(e),
            ListenerError::Bind(_) | ListenerError::Closed => false,
        }
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Closed => None,
        }
    }
}

/// Parse a bind address, accepting `:port` for all interfaces.
pub fn parse_bind_address(address: &str) -> Result<SocketAddr, AddrParseError> {
    let address = address.trim();
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port).parse(),
        None => address.parse(),
    }
}

// EBADF / EINVAL: the socket itself is gone or unusable.
const EBADF: i32 = 9;
const EINVAL: i32 = 22;
// ENFILE / EMFILE: out of file descriptors.
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE)) || e.kind() == io::ErrorKind::OutOfMemory
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    if matches!(e.raw_os_error(), Some(EBADF) | Some(EINVAL)) {
        return false;
    }
    !matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected | io::ErrorKind::Unsupported
    )
}

fn accept_error_kind(e: &io::Error) -> &'static str {
    if is_resource_exhaustion(e) {
        "resource_exhaustion"
    } else if is_transient_accept_error(e) {
        "transient"
    } else {
        "fatal"
    }
}

/// A bounded TCP listener that limits concurrent sessions.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait in the kernel backlog until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent sessions.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = parse_bind_address(&config.bind_address)
            .map_err(|e| ListenerError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    pub async fn accept(&self) -> Result<Connection, ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer_addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %peer_addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok(Connection {
            stream,
            peer_addr,
            permit: ConnectionPermit { _permit: permit },
        })
    }

    /// Stop handing out connection slots. Pending and future `accept` calls fail with `Closed`.
    pub fn close(&self) {
        self.connection_limit.close();
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// An accepted connection and the slot it occupies.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub permit: ConnectionPermit,
}

/// A permit representing a connection slot.
///
/// When dropped, the slot is released back to the pool,
/// even if the session task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Accept connections until shutdown or a fatal listener error.
///
/// Each connection is handed to `on_accept` on its own task; the loop
/// does not wait for it.
pub async fn accept_loop<F, Fut>(
    listener: Listener,
    mut shutdown: broadcast::Receiver<()>,
    mut on_accept: F,
) -> Result<(), ListenerError>
where
    F: FnMut(Connection) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = signalled(&mut shutdown) => {
                tracing::info!("Accept loop received shutdown signal, exiting loop");
                return Ok(());
            }
        };

        match accepted {
            Ok(connection) => {
                tokio::spawn(on_accept(connection));
            }
            Err(ListenerError::Accept(e)) if is_transient_accept_error(&e) => {
                metrics::record_accept_error(accept_error_kind(&e));
                tracing::warn!(error = %e, "Accept failed, continuing");
                if is_resource_exhaustion(&e) {
                    tokio::time::sleep(RESOURCE_BACKOFF).await;
                }
            }
            Err(e) => {
                if let ListenerError::Accept(io) = &e {
                    metrics::record_accept_error(accept_error_kind(io));
                }
                tracing::error!(error = %e, "Accept loop stopped");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    fn local_config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections,
        }
    }

    #[test]
    fn parses_port_shorthand() {
        assert_eq!(
            parse_bind_address(":8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_address(" 127.0.0.1:9000 ").unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_bind_address("localhost").is_err());
        assert!(parse_bind_address(":http").is_err());
    }

    #[test]
    fn classifies_accept_errors() {
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert!(ListenerError::Accept(aborted).is_transient());

        let emfile = io::Error::from_raw_os_error(EMFILE);
        assert!(is_transient_accept_error(&emfile));
        assert!(is_resource_exhaustion(&emfile));

        let ebadf = io::Error::from_raw_os_error(EBADF);
        assert!(!ListenerError::Accept(ebadf).is_transient());

        assert!(!ListenerError::Closed.is_transient());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let first = Listener::bind(&local_config(1)).await.unwrap();
        let taken = ListenerConfig {
            bind_address: first.local_addr().unwrap().to_string(),
            max_connections: 1,
        };
        let err = Listener::bind(&taken).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind(_)));
    }

    #[tokio::test]
    async fn permit_is_held_for_connection_lifetime() {
        let listener = Listener::bind(&local_config(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let conn = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(conn);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn closed_listener_reports_closed() {
        let listener = Listener::bind(&local_config(1)).await.unwrap();
        listener.close();
        let err = listener.accept().await.err().unwrap();
        assert!(matches!(err, ListenerError::Closed));
    }

    #[tokio::test]
    async fn accept_loop_does_not_wait_for_handlers() {
        let listener = Listener::bind(&local_config(16)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let server = tokio::spawn(accept_loop(listener, shutdown_rx, move |mut conn| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                // Holds the connection until the client hangs up.
                let mut buf = [0u8; 16];
                let _ = conn.stream.read(&mut buf).await;
            }
        }));

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(TcpStream::connect(addr).await.unwrap());
        }
        for _ in 0..50 {
            if accepted.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 3);

        shutdown_tx.send(()).unwrap();
        assert!(server.await.unwrap().is_ok());
    }
}
