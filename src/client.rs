//! Client for the TCP protocol.
//!
//! Holds one connection and the codec state for it, so responses to
//! pipelined requests come back in order.

use serde_json::Value;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::{CodecError, JsonCodec, Request, Response};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("send failed: {0}")]
    Send(#[source] CodecError),

    #[error("receive failed: {0}")]
    Receive(#[source] CodecError),

    #[error("server closed the connection")]
    Closed,
}

pub struct RouteClient {
    stream: TcpStream,
    codec: JsonCodec,
}

impl RouteClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        Ok(Self {
            stream,
            codec: JsonCodec::default(),
        })
    }

    /// Write a request without waiting for its response.
    pub async fn send_only(&mut self, request: &Request) -> Result<(), ClientError> {
        JsonCodec::encode(&mut self.stream, request)
            .await
            .map_err(ClientError::Send)
    }

    /// Read the next response.
    pub async fn receive(&mut self) -> Result<Response, ClientError> {
        match self.codec.decode(&mut self.stream).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(ClientError::Closed),
            Err(e) => Err(ClientError::Receive(e)),
        }
    }

    /// Send `request` and wait for its response.
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        self.send_only(request).await?;
        self.receive().await
    }

    pub async fn call(
        &mut self,
        route: impl Into<String>,
        content: impl Into<Value>,
    ) -> Result<Response, ClientError> {
        self.send(&Request::new(route, content)).await
    }
}
