//! TCP delivery for frames too large for one datagram.
//!
//! The peer opens every stream connection with a greeting banner. Only after
//! the banner advertises the same protocol version is the frame written; the
//! peer then answers with one framed reply whose `bExpectReply` flag says
//! whether it intends to respond further.
//!
//! Connect, read and write are all bounded by the fallback's timeout so a
//! silent peer cannot stall the event loop.

use std::fs;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use txproc_wire::{Greeting, codec};

use super::errors::SendError;
use super::{Delivery, TRANSPORT_TARGET};

/// Bound on each connect, read and write of a stream delivery.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Services database consulted for named services.
const SERVICES_DB: &str = "/etc/services";

/// Host and service used when a frame does not fit in a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFallback {
    host: String,
    service: String,
    timeout: Duration,
}

impl StreamFallback {
    /// Creates a fallback target. `service` is a port number or a TCP service
    /// name listed in `/etc/services`.
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            timeout: STREAM_TIMEOUT,
        }
    }

    /// Replaces the per-operation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Target service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Per-operation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connects, checks the greeting, writes `frame` and reads the reply.
    pub(crate) fn deliver(&self, frame: &[u8]) -> Result<Delivery, SendError> {
        let mut stream = self.connect()?;
        let greeting =
            Greeting::read_from(&mut stream).map_err(|source| SendError::Handshake { source })?;
        debug!(
            target: TRANSPORT_TARGET,
            server = greeting.server(),
            version = greeting.protocol_version(),
            max_datagram = ?greeting.max_datagram(),
            "stream greeting accepted"
        );

        stream.write_all(frame).map_err(SendError::io)?;
        stream.flush().map_err(SendError::io)?;

        let reply = codec::decode(&mut stream).map_err(|source| SendError::Reply { source })?;
        debug!(
            target: TRANSPORT_TARGET,
            len = frame.len(),
            expect_reply = reply.expect_reply(),
            "stream delivery acknowledged"
        );
        Ok(if reply.expect_reply() {
            Delivery::DeliveredExpectReply
        } else {
            Delivery::Delivered
        })
    }

    fn connect(&self) -> Result<TcpStream, SendError> {
        let port = self.port()?;
        let addresses = (self.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|error| self.resolve_error(error.to_string()))?;

        let mut attempts = Vec::new();
        for address in addresses {
            match self.open(address) {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    warn!(target: TRANSPORT_TARGET, %address, %error, "stream connect failed");
                    attempts.push(format!("{address}: {error}"));
                }
            }
        }
        if attempts.is_empty() {
            attempts.push("no addresses resolved".to_owned());
        }
        Err(SendError::Connect {
            host: self.host.clone(),
            service: self.service.clone(),
            attempts,
        })
    }

    fn open(&self, address: SocketAddr) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&address, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    fn port(&self) -> Result<u16, SendError> {
        if let Ok(port) = self.service.parse::<u16>() {
            return Ok(port);
        }
        let services = fs::read_to_string(SERVICES_DB)
            .map_err(|error| self.resolve_error(format!("cannot read {SERVICES_DB}: {error}")))?;
        tcp_service_port(&services, &self.service)
            .ok_or_else(|| self.resolve_error(format!("unknown tcp service in {SERVICES_DB}")))
    }

    fn resolve_error(&self, message: String) -> SendError {
        SendError::Resolve {
            host: self.host.clone(),
            service: self.service.clone(),
            message,
        }
    }
}

/// Looks `name` up among the TCP entries of a services database.
///
/// Lines read `name port/protocol [aliases...]`; `#` starts a comment.
fn tcp_service_port(services: &str, name: &str) -> Option<u16> {
    services.lines().find_map(|line| {
        let entry = line.split('#').next().unwrap_or_default();
        let mut fields = entry.split_whitespace();
        let canonical = fields.next()?;
        let (port, protocol) = fields.next()?.split_once('/')?;
        let listed = canonical == name || fields.any(|alias| alias == name);
        if listed && protocol == "tcp" {
            port.parse().ok()
        } else {
            None
        }
    })
}
