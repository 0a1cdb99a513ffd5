//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Decoded Request { route, content }
//!     → router.rs (route lookup)
//!     → handlers.rs / user handler (content → message)
//!     → Return: ok Response, or nok Response for no-match / handler failure
//!
//! Route Compilation (at startup):
//!     register(name, handler)...
//!     → build()
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - Deterministic: same name always reaches the same handler
//! - Every decoded request gets exactly one Response

pub mod handlers;
pub mod router;

pub use router::{Handler, HandlerError, RouteNotFound, Router, RouterBuilder, RouterError};

/// Router with the built-in `echo` and `ack` routes.
pub fn default_router() -> Result<Router, RouterError> {
    let mut builder = Router::builder();
    builder
        .register("echo", handlers::echo)?
        .register("ack", handlers::ack)?;
    Ok(builder.build())
}
