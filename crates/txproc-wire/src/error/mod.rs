//! Errors raised while framing, parsing and negotiating txProc events.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can tell a cleanly closed peer apart from a corrupt frame. I/O errors are
//! wrapped in `Arc` to satisfy the `result_large_err` Clippy lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::event::ExecMode;

/// Errors produced by [`crate::codec::encode`] and friends.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The framed payload does not fit the six-digit length field.
    #[error("payload of {len} bytes exceeds the {limit} byte frame limit")]
    PayloadTooLarge {
        /// Payload length that would have been declared.
        len: usize,
        /// Largest representable payload length.
        limit: usize,
    },

    /// A section could not be rendered as JSON.
    #[error("failed to serialise {section} section: {source}")]
    Json {
        /// Wire name of the section.
        section: &'static str,
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing the encoded frame failed.
    #[error("failed to write encoded event: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl EncodeError {
    pub(crate) fn json(section: &'static str, source: serde_json::Error) -> Self {
        Self::Json { section, source }
    }

    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}

/// Errors produced while decoding a framed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The source was exhausted before any byte of a new frame arrived.
    #[error("end of stream")]
    EndOfStream,

    /// The frame header is short or does not follow the expected layout.
    #[error("malformed frame header: {message}")]
    MalformedHeader {
        /// Description of the structural problem.
        message: String,
    },

    /// The frame header names a protocol version this codec does not speak.
    #[error("unsupported protocol version '{found}' (expected '{expected}')")]
    UnsupportedProtocolVersion {
        /// Version token found in the header.
        found: String,
        /// Version this codec implements.
        expected: &'static str,
    },

    /// Fewer body bytes arrived than the frame header declared.
    #[error("truncated body: expected {expected} bytes, received {received}")]
    TruncatedBody {
        /// Declared payload length.
        expected: usize,
        /// Bytes read before the source was exhausted.
        received: usize,
    },

    /// The block header or a section body is invalid.
    #[error("malformed body: {message}")]
    MalformedBody {
        /// Description of the problem.
        message: String,
        /// Optional underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Reading from the source failed.
    #[error("I/O error while decoding event: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl DecodeError {
    pub(crate) fn header(message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: message.into(),
        }
    }

    pub(crate) fn body(message: impl Into<String>) -> Self {
        Self::MalformedBody {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn section(section: &'static str, source: serde_json::Error) -> Self {
        Self::MalformedBody {
            message: format!("invalid {section} section"),
            source: Some(source),
        }
    }

    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }

    /// Returns `true` when the peer closed the stream between frames.
    #[must_use]
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// Errors raised while reading the stream connection greeting.
#[derive(Debug, Error)]
pub enum GreetingError {
    /// The banner ended before its declared length.
    #[error("greeting truncated after {received} bytes")]
    Truncated {
        /// Bytes received.
        received: usize,
    },

    /// The banner does not carry a recognisable version token.
    #[error("unrecognised greeting '{banner}'")]
    Unrecognised {
        /// Banner text as received.
        banner: String,
    },

    /// The server speaks a different protocol version.
    #[error("server protocol version '{found}' does not match '{expected}'")]
    UnsupportedProtocolVersion {
        /// Version advertised by the server.
        found: String,
        /// Version this client implements.
        expected: &'static str,
    },

    /// Reading the banner failed.
    #[error("I/O error while reading greeting: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Raised when an [`crate::ExecParams`] operation needs the other mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution parameters are {actual}, operation requires {required}")]
pub struct ExecModeError {
    /// Mode the operation needs.
    pub required: ExecMode,
    /// Mode the container is currently in.
    pub actual: ExecMode,
}
