//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Decoded request (TCP) or HTTP request:
//!     → admission.rs (per-client fixed-window count)
//!     → Allowed: pass to routing
//!     → Rejected: failure Response (TCP) or 429 (HTTP)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a client over its limit never reaches a handler
//! - No trust in client input: identity comes from the socket, not the payload

pub mod admission;

pub use admission::{Admission, AdmissionController};
