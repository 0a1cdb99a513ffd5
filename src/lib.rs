//! JSON request/response session server over TCP.

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod security;

pub use config::ServerConfig;
pub use lifecycle::Shutdown;
pub use net::Server;
pub use protocol::{Request, Response};
pub use routing::Router;
