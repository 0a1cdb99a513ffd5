//! HTTP front end subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → server.rs (Axum setup, trace + timeout layers)
//!     → middleware/admission.rs (per-client quota, 429 when exceeded)
//!     → routing (same route table as the TCP sessions)
//!     → JSON Response body
//! ```

pub mod middleware;
pub mod server;

pub use server::HttpServer;
