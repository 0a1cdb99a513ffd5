//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, error classification)
//!     → connection.rs (session id, live-session tracking)
//!     → session.rs (decode → admit → dispatch → encode under a hard deadline)
//!     → server.rs (wires the above together per connection)
//!
//! Session States:
//!     Accepted → Active → TimedOut | Closed | Failed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each session tracked for graceful shutdown
//! - No session can outlive its deadline

pub mod connection;
pub mod listener;
pub mod server;
pub mod session;

pub use listener::{Listener, ListenerError};
pub use server::Server;
pub use session::{Session, SessionEnd, SessionError, SessionState};
