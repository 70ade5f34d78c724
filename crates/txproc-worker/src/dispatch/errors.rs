//! Error types for hook failures and event loop termination.

use std::io;

use thiserror::Error;

use txproc_wire::EncodeError;

use crate::transport::{PollError, SendError};

/// Failure reported by a hook.
///
/// The dispatcher turns a hook failure on an input event into a failed
/// `EV_RESULT` reply; failures elsewhere are logged and the loop carries on.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook rejected the event.
    #[error("{message}")]
    Failed {
        /// Human-readable cause.
        message: String,
    },
    /// The hook panicked.
    #[error("handler panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
    /// The hook hit an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The hook failed to deliver an event itself.
    #[error("delivery failed: {0}")]
    Send(#[from] SendError),
}

impl HookError {
    /// Creates a failure with a custom message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Conditions that stop the event loop.
#[derive(Debug, Error)]
pub enum LoopError {
    /// Waiting on the readiness set failed.
    #[error(transparent)]
    Poll(#[from] PollError),
    /// Neither the reply nor a failure notice could be encoded.
    #[error("failed to encode reply: {source}")]
    Encode {
        /// Codec error.
        #[source]
        source: EncodeError,
    },
    /// The reply could not be written to the primary output.
    #[error("failed to write reply: {source}")]
    Reply {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Standard input or output could not be duplicated.
    #[error("failed to open standard streams: {source}")]
    Stdio {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
