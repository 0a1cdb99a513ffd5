//! Streaming JSON framing.
//!
//! # Responsibilities
//! - Pull exactly one JSON value off a byte stream per `decode` call
//! - Keep bytes that belong to the next value for the next call
//! - Write one compact JSON value per `encode` call
//!
//! # Design Decisions
//! - The same codec type serves both directions (server decodes `Request`,
//!   client decodes `Response`)
//! - A syntax or shape error is reported as `Malformed` and the carry buffer
//!   is left as-is: callers must drop the connection
//! - Pending bytes are bounded by `max_frame_bytes`
//! - Value boundaries come from a forward-only scan over new bytes; serde
//!   parses each value exactly once, so decode cost is linear in frame size
//!   however the frame is split across reads

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound for a single pending value.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Errors produced while framing values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the stream in the middle of a value.
    #[error("connection closed in the middle of a value")]
    UnexpectedEof,

    /// The bytes do not form a value of the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A single value grew past the configured limit.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// The outgoing value could not be serialized.
    #[error("failed to serialize value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Self-delimited JSON codec with a carry buffer for pipelined values.
#[derive(Debug)]
pub struct JsonCodec {
    buf: Vec<u8>,
    max_frame_bytes: usize,
    scanner: FrameScanner,
}

impl JsonCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes,
            scanner: FrameScanner::default(),
        }
    }

    /// Bytes already read from the stream but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next value from `reader`.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a value boundary.
    /// Cancel-safe: dropping the future loses no bytes that were read.
    pub async fn decode<T, R>(&mut self, reader: &mut R) -> Result<Option<T>, CodecError>
    where
        T: DeserializeOwned,
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(value) = self.try_parse()? {
                return Ok(Some(value));
            }

            if self.buf.len() >= self.max_frame_bytes {
                return Err(CodecError::FrameTooLarge {
                    limit: self.max_frame_bytes,
                });
            }

            // Never read past the limit so an oversized value cannot slip through in one read.
            let room = self.max_frame_bytes - self.buf.len();
            self.buf.reserve(room.min(READ_CHUNK));
            let n = (&mut *reader)
                .take(room as u64)
                .read_buf(&mut self.buf)
                .await?;
            if n == 0 {
                return self.finish();
            }
        }
    }

    /// Serialize `value` and write it followed by a newline.
    pub async fn encode<T, W>(writer: &mut W, value: &T) -> Result<(), CodecError>
    where
        T: Serialize,
        W: AsyncWrite + Unpin,
    {
        let mut bytes = serde_json::to_vec(value).map_err(CodecError::Encode)?;
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Take one complete value off the front of the buffer, if the scanner has seen its end.
    fn try_parse<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        if !self.scanner.in_progress() {
            let leading = self
                .buf
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(self.buf.len());
            self.buf.drain(..leading);
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        match self.scanner.scan(&self.buf) {
            Some(end) => self.take_value(end).map(Some),
            None => Ok(None),
        }
    }

    /// The stream ended. Whatever is left must be exactly one value or nothing.
    fn finish<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match serde_json::from_slice::<T>(&self.buf) {
            Ok(value) => {
                self.buf.clear();
                self.scanner = FrameScanner::default();
                Ok(Some(value))
            }
            Err(e) if e.is_eof() => Err(CodecError::UnexpectedEof),
            Err(e) => Err(CodecError::Malformed(e)),
        }
    }

    fn take_value<T: DeserializeOwned>(&mut self, end: usize) -> Result<T, CodecError> {
        let value = serde_json::from_slice(&self.buf[..end]).map_err(CodecError::Malformed)?;
        self.buf.drain(..end);
        self.scanner = FrameScanner::default();
        Ok(value)
    }
}

/// Finds where the top-level value at the front of the buffer ends.
///
/// Only looks at bytes it has not seen before, so a value that arrives in
/// many small reads is scanned once in total. It tracks nesting and string
/// state, not grammar: serde gets the bytes once an end is found and reports
/// anything malformed.
#[derive(Debug, Default)]
struct FrameScanner {
    /// Bytes of the buffer already examined.
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// The value is a number or literal, which ends at the first delimiter.
    bare: bool,
}

impl FrameScanner {
    fn in_progress(&self) -> bool {
        self.offset > 0
    }

    /// Returns the end of the value, exclusive. `buf` starts at the value's first byte.
    fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        if self.offset == 0 {
            self.bare = !matches!(buf.first(), Some(b'{' | b'[' | b'"'));
        }

        while self.offset < buf.len() {
            let byte = buf[self.offset];
            self.offset += 1;

            if self.bare {
                if byte.is_ascii_whitespace() || b"{}[],:\"".contains(&byte) {
                    // A leading delimiter is its own (malformed) value.
                    return Some((self.offset - 1).max(1));
                }
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(self.offset);
                    }
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.offset);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
