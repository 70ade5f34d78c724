//! Delivery of events to the txProc peer and readiness polling.
//!
//! Follow-up events leave the worker over one of three routes: a connected
//! Unix datagram socket, a TCP stream opened per message when a frame is too
//! large for a datagram, or the process's own stdout when the destination
//! server is `-`.

mod errors;
mod poll;
mod sender;
mod stream;

use txproc_wire::Event;

pub use self::errors::{PollError, SendError, SocketSetupError};
pub use self::poll::{FdPoller, ReadinessPoll};
pub use self::sender::EventSender;
pub use self::stream::{STREAM_TIMEOUT, StreamFallback};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Outcome of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The peer accepted the event and will not reply.
    Delivered,
    /// The peer accepted the event and signalled that it will reply.
    DeliveredExpectReply,
}

/// Destination for follow-up events.
pub trait EventSink {
    /// Frames and delivers one event.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] when the event cannot be encoded or delivered.
    fn send(&mut self, event: &Event) -> Result<Delivery, SendError>;
}
