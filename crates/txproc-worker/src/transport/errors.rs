//! Errors raised while creating sockets and delivering events.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use txproc_config::SocketPreparationError;
use txproc_wire::{DecodeError, EncodeError, GreetingError};

/// Failures delivering one event to the peer.
///
/// Every variant is scoped to a single send; the sender is usable again
/// afterwards.
#[derive(Debug, Error)]
pub enum SendError {
    /// The event could not be framed.
    #[error("failed to encode event: {source}")]
    Encode {
        /// Codec error.
        #[source]
        source: EncodeError,
    },
    /// The frame exceeds the datagram ceiling and no stream fallback exists.
    #[error("message of {len} bytes exceeds the {limit} byte datagram limit and no stream fallback is configured")]
    MessageTooLarge {
        /// Encoded frame length.
        len: usize,
        /// Datagram ceiling.
        limit: usize,
    },
    /// No datagram socket, pipe or stream fallback is configured.
    #[error("no route configured for outgoing events")]
    NoRoute,
    /// The fallback host or service could not be resolved.
    #[error("failed to resolve {host}:{service}: {message}")]
    Resolve {
        /// Fallback host.
        host: String,
        /// Fallback service.
        service: String,
        /// Resolver diagnostic.
        message: String,
    },
    /// Every resolved address refused the stream connection.
    #[error("failed to connect to {host}:{service}: {}", attempts.join("; "))]
    Connect {
        /// Fallback host.
        host: String,
        /// Fallback service.
        service: String,
        /// One entry per address tried.
        attempts: Vec<String>,
    },
    /// The stream greeting was missing or spoke another protocol version.
    #[error("stream handshake failed: {source}")]
    Handshake {
        /// Greeting error.
        #[source]
        source: GreetingError,
    },
    /// Writing the frame failed.
    #[error("failed to write event: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The reply after a stream write could not be read.
    #[error("failed to read stream reply: {source}")]
    Reply {
        /// Codec error.
        #[source]
        source: DecodeError,
    },
}

impl SendError {
    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}

impl From<EncodeError> for SendError {
    fn from(source: EncodeError) -> Self {
        Self::Encode { source }
    }
}

/// Failures creating the local datagram socket at startup.
#[derive(Debug, Error)]
pub enum SocketSetupError {
    /// The socket directory could not be prepared.
    #[error(transparent)]
    Prepare(#[from] SocketPreparationError),
    /// Binding the local socket path failed.
    #[error("failed to bind datagram socket {path}: {source}")]
    Bind {
        /// Local socket path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Connecting to the peer socket failed.
    #[error("failed to connect datagram socket to {path}: {source}")]
    Connect {
        /// Peer socket path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Failure waiting on the readiness set.
#[derive(Debug, Error)]
#[error("readiness poll failed: {source}")]
pub struct PollError {
    /// Operating system error.
    #[source]
    pub source: nix::errno::Errno,
}
