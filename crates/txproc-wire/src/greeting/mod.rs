//! Banner sent by a txProc server when a stream connection opens.
//!
//! The banner is a three-digit length, a colon and that many bytes of text:
//!
//! ```text
//! 032:txProc@host pver 3.0 md 32768
//! ```
//!
//! `pver` is the protocol version and must match [`PROTOCOL_VERSION`]. `md`
//! is the server's datagram ceiling and may be absent.

use std::io::Read;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::codec::{PROTOCOL_VERSION, read_full};
use crate::error::GreetingError;

const PREFIX_LEN: usize = 4;

static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| pattern(r"pver ([\d.]+)"));
static DATAGRAM_TOKEN: LazyLock<Regex> = LazyLock::new(|| pattern(r"\bmd (\d+)"));

#[expect(clippy::expect_used, reason = "patterns are literals")]
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("greeting pattern compiles")
}

/// Parsed server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    server: String,
    protocol_version: String,
    max_datagram: Option<usize>,
}

impl Greeting {
    /// Parses the banner text that follows the length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`GreetingError::Unrecognised`] when no version token is
    /// present and [`GreetingError::UnsupportedProtocolVersion`] when the
    /// server speaks another version.
    ///
    /// # Example
    ///
    /// ```
    /// use txproc_wire::Greeting;
    ///
    /// let greeting = Greeting::parse("txProc@host pver 3.0 md 32768").expect("greeting");
    /// assert_eq!(greeting.server(), "txProc@host");
    /// assert_eq!(greeting.max_datagram(), Some(32768));
    /// ```
    pub fn parse(banner: &str) -> Result<Self, GreetingError> {
        let version = VERSION_TOKEN
            .captures(banner)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_owned())
            .ok_or_else(|| GreetingError::Unrecognised {
                banner: banner.to_owned(),
            })?;
        if version != PROTOCOL_VERSION {
            return Err(GreetingError::UnsupportedProtocolVersion {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }
        let max_datagram = DATAGRAM_TOKEN
            .captures(banner)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse().ok());
        let server = banner
            .split_whitespace()
            .next()
            .filter(|word| *word != "pver")
            .unwrap_or_default()
            .to_owned();
        Ok(Self {
            server,
            protocol_version: version,
            max_datagram,
        })
    }

    /// Reads and parses a length-prefixed banner from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`GreetingError::Truncated`] when the stream ends early,
    /// [`GreetingError::Io`] on read failure, otherwise as for
    /// [`Greeting::parse`].
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, GreetingError> {
        let mut prefix = [0_u8; PREFIX_LEN];
        let received = read_full(reader, &mut prefix).map_err(io_error)?;
        if received < PREFIX_LEN {
            return Err(GreetingError::Truncated { received });
        }
        let [d0, d1, d2, separator] = prefix;
        let digits = [d0, d1, d2];
        let banner_len = std::str::from_utf8(&digits)
            .ok()
            .filter(|_| separator == b':')
            .and_then(|text| text.parse::<usize>().ok())
            .ok_or_else(|| GreetingError::Unrecognised {
                banner: String::from_utf8_lossy(&prefix).into_owned(),
            })?;

        let mut banner = vec![0_u8; banner_len];
        let banner_received = read_full(reader, &mut banner).map_err(io_error)?;
        if banner_received < banner_len {
            return Err(GreetingError::Truncated {
                received: PREFIX_LEN + banner_received,
            });
        }
        Self::parse(String::from_utf8_lossy(&banner).trim_end())
    }

    /// Returns the server identity, for example `txProc@host`.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the advertised protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Returns the server's datagram ceiling when advertised.
    #[must_use]
    pub const fn max_datagram(&self) -> Option<usize> {
        self.max_datagram
    }
}

fn io_error(source: std::io::Error) -> GreetingError {
    GreetingError::Io {
        source: Arc::new(source),
    }
}
