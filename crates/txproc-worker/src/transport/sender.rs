//! Outgoing event delivery.

use std::fmt;
use std::io::{self, Write};
use std::os::unix::net::UnixDatagram;

use tracing::{debug, info};

use txproc_config::Config;
use txproc_wire::{Event, MAX_DATAGRAM_LEN, codec};

use super::errors::{SendError, SocketSetupError};
use super::stream::StreamFallback;
use super::{Delivery, EventSink, TRANSPORT_TARGET};

/// Routes framed events over the datagram socket, stdout or a TCP stream.
///
/// The datagram socket wins when present; frames above
/// [`MAX_DATAGRAM_LEN`] then move to the stream fallback. Without a datagram
/// socket the pipe is used, and without either the stream fallback carries
/// everything.
#[derive(Default)]
pub struct EventSender {
    datagram: Option<UnixDatagram>,
    pipe: Option<Box<dyn Write + Send>>,
    fallback: Option<StreamFallback>,
}

impl EventSender {
    /// Creates a sender with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the routes described by `config`.
    ///
    /// With a peer socket configured, the local socket directory is prepared,
    /// any stale socket file is removed and a datagram socket is bound and
    /// connected.
    ///
    /// # Errors
    ///
    /// Returns [`SocketSetupError`] when the socket cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, SocketSetupError> {
        let mut sender = Self::new();
        if let Some(peer) = config.peer_socket() {
            let local = config.local_socket();
            local.prepare_filesystem()?;
            let socket =
                UnixDatagram::bind(local.path()).map_err(|source| SocketSetupError::Bind {
                    path: local.path().to_path_buf(),
                    source,
                })?;
            socket
                .connect(peer)
                .map_err(|source| SocketSetupError::Connect {
                    path: peer.to_path_buf(),
                    source,
                })?;
            info!(
                target: TRANSPORT_TARGET,
                local = %local,
                peer = %peer,
                fallback = ?config.fallback(),
                "datagram socket connected"
            );
            sender = sender.with_datagram(socket);
        }
        if let Some((host, service)) = config.fallback() {
            sender = sender.with_fallback(StreamFallback::new(host, service));
        }
        if config.routes_to_pipe() {
            sender = sender.with_pipe(io::stdout());
        }
        Ok(sender)
    }

    /// Adds a connected datagram socket.
    #[must_use]
    pub fn with_datagram(mut self, socket: UnixDatagram) -> Self {
        self.datagram = Some(socket);
        self
    }

    /// Adds a pipe destination.
    #[must_use]
    pub fn with_pipe(mut self, writer: impl Write + Send + 'static) -> Self {
        self.pipe = Some(Box::new(writer));
        self
    }

    /// Adds a stream fallback.
    #[must_use]
    pub fn with_fallback(mut self, fallback: StreamFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<Delivery, SendError> {
        if let Some(socket) = &self.datagram {
            if frame.len() <= MAX_DATAGRAM_LEN {
                let sent = socket.send(frame).map_err(SendError::io)?;
                if sent != frame.len() {
                    return Err(SendError::io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("datagram truncated to {sent} of {} bytes", frame.len()),
                    )));
                }
                debug!(target: TRANSPORT_TARGET, len = frame.len(), "datagram sent");
                return Ok(Delivery::Delivered);
            }
            return match &self.fallback {
                Some(fallback) => fallback.deliver(frame),
                None => Err(SendError::MessageTooLarge {
                    len: frame.len(),
                    limit: MAX_DATAGRAM_LEN,
                }),
            };
        }
        if let Some(pipe) = self.pipe.as_mut() {
            pipe.write_all(frame).map_err(SendError::io)?;
            pipe.flush().map_err(SendError::io)?;
            debug!(target: TRANSPORT_TARGET, len = frame.len(), "frame written to pipe");
            return Ok(Delivery::Delivered);
        }
        match &self.fallback {
            Some(fallback) => fallback.deliver(frame),
            None => Err(SendError::NoRoute),
        }
    }
}

impl EventSink for EventSender {
    fn send(&mut self, event: &Event) -> Result<Delivery, SendError> {
        let frame = codec::encode(event)?;
        self.send_frame(&frame)
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("datagram", &self.datagram)
            .field("pipe", &self.pipe.is_some())
            .field("fallback", &self.fallback)
            .finish()
    }
}
