//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming bytes
//!     → codec.rs (find the next self-delimited JSON value)
//!     → message.rs (Request { route, content })
//!     → [router produces a Response]
//!     → codec.rs (compact JSON + '\n')
//!     → Outgoing bytes
//! ```
//!
//! # Design Decisions
//! - No length prefix: JSON objects terminate themselves
//! - Values may arrive back-to-back on one connection (pipelining)
//! - A malformed value is fatal for the connection; the stream is never resynchronised

pub mod codec;
pub mod message;

pub use codec::{CodecError, JsonCodec};
pub use message::{Request, Response};
