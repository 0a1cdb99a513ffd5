//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use route_server::config::{ListenerConfig, SessionConfig};
use route_server::lifecycle::Shutdown;
use route_server::net::connection::SessionTracker;
use route_server::net::{Listener, ListenerError, Server};
use route_server::routing::default_router;
use route_server::security::AdmissionController;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// A server on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: SessionTracker,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

impl TestServer {
    /// Stop accepting and wait for the accept loop to exit.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

/// Start a server with the built-in routes.
pub async fn start_server(
    deadline: Duration,
    admission: Option<Arc<AdmissionController>>,
) -> TestServer {
    let listener = Listener::bind(&ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
        max_connections: 64,
    })
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();

    let mut server = Server::new(
        Arc::new(default_router().unwrap()),
        SessionConfig {
            deadline_ms: deadline.as_millis() as u64,
            ..SessionConfig::default()
        },
    );
    if let Some(admission) = admission {
        server = server.with_admission(admission);
    }
    let tracker = server.tracker();

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, &signal).await });

    TestServer {
        addr,
        shutdown,
        tracker,
        handle,
    }
}

/// A raw client: write arbitrary bytes, read newline-delimited responses.
pub struct RawClient {
    pub lines: Lines<BufReader<OwnedReadHalf>>,
    pub write: OwnedWriteHalf,
}

impl RawClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.write.write_all(bytes).await.unwrap();
    }

    /// Next response line, or None once the server has closed the connection.
    pub async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for response")
            .unwrap_or(None)
    }
}
