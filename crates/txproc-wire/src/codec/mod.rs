//! Framing between [`Event`] values and the txProc wire format.
//!
//! A frame is two fixed-width ASCII header lines followed by four compact
//! JSON documents:
//!
//! ```text
//! #frameNewframe#v3.0:<payload length, 6 digits>\n
//! 04,1,<part1>,1,<part2>,1,<sysParams>,1,<execParams>\n   (lengths, 6 digits each)
//! <part1><part2><sysParams><execParams>
//! ```
//!
//! The payload length counts everything after the first line. Section
//! lengths are authoritative: the decoder slices the body by them and never
//! scans for delimiters.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str;
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::Error as _;
use serde_json::{Map, Value};

use crate::error::{DecodeError, EncodeError};
use crate::event::{Event, EventType, ExecParams, Metadata, Routing, SystemParams, int_from_value};

/// Literal that opens every frame.
pub const FRAME_MARKER: &str = "#frameNewframe#v";
/// Protocol version spoken by this codec.
pub const PROTOCOL_VERSION: &str = "3.0";
/// Length of the frame header line, newline included.
pub const FRAME_HEADER_LEN: usize = FRAME_MARKER.len() + PROTOCOL_VERSION.len() + 8;
/// Length of the block header line, newline included.
pub const BLOCK_HEADER_LEN: usize = 39;
/// Number of JSON sections in every frame.
pub const SECTION_COUNT: usize = 4;
/// Largest payload length representable in the six-digit field.
pub const MAX_PAYLOAD_LEN: usize = 999_999;
/// Largest frame, headers included, that fits one datagram to the peer.
pub const MAX_DATAGRAM_LEN: usize = 32_768;

const ROUTING: &str = "part1";
const METADATA: &str = "part2";
const SYSTEM: &str = "sysParams";
const EXEC: &str = "execParams";
const EVENT_TYPE_KEY: &str = "eventType";

static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(block_header_pattern);

#[expect(clippy::expect_used, reason = "pattern is a literal")]
fn block_header_pattern() -> Regex {
    Regex::new(r"^(\d{2}),1,(\d{6}),1,(\d{6}),1,(\d{6}),1,(\d{6})\n$")
        .expect("block header pattern compiles")
}

/// Serialises an event into one wire frame.
///
/// Each section is rendered as compact JSON. The event type code is injected
/// into the routing section, so that section is never empty. JSON text
/// produced from Rust strings is always valid UTF-8.
///
/// # Errors
///
/// Returns [`EncodeError::PayloadTooLarge`] when the payload does not fit the
/// six-digit length field, or [`EncodeError::Json`] when a section cannot be
/// rendered.
pub fn encode(event: &Event) -> Result<Vec<u8>, EncodeError> {
    let sections = [
        encode_routing(event)?,
        serde_json::to_vec(&event.metadata).map_err(|e| EncodeError::json(METADATA, e))?,
        serde_json::to_vec(&event.system).map_err(|e| EncodeError::json(SYSTEM, e))?,
        serde_json::to_vec(&event.exec).map_err(|e| EncodeError::json(EXEC, e))?,
    ];
    let [part1, part2, system, exec] = &sections;

    let payload_len = BLOCK_HEADER_LEN + sections.iter().map(Vec::len).sum::<usize>();
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLarge {
            len: payload_len,
            limit: MAX_PAYLOAD_LEN,
        });
    }

    let headers = format!(
        "{FRAME_MARKER}{PROTOCOL_VERSION}:{payload_len:06}\n\
         {SECTION_COUNT:02},1,{:06},1,{:06},1,{:06},1,{:06}\n",
        part1.len(),
        part2.len(),
        system.len(),
        exec.len(),
    );
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload_len);
    frame.extend_from_slice(headers.as_bytes());
    for section in &sections {
        frame.extend_from_slice(section);
    }
    Ok(frame)
}

fn encode_routing(event: &Event) -> Result<Vec<u8>, EncodeError> {
    let Value::Object(mut object) =
        serde_json::to_value(&event.routing).map_err(|e| EncodeError::json(ROUTING, e))?
    else {
        return Err(EncodeError::json(
            ROUTING,
            serde_json::Error::custom("routing did not serialise to an object"),
        ));
    };
    object.insert(
        EVENT_TYPE_KEY.to_owned(),
        Value::from(event.event_type().code()),
    );
    serde_json::to_vec(&object).map_err(|e| EncodeError::json(ROUTING, e))
}

/// Reads exactly one frame from `reader`.
///
/// The header is read first; the body is then read in full, retrying short
/// and interrupted reads. Nothing is returned until the whole frame has been
/// parsed.
///
/// # Errors
///
/// Returns [`DecodeError::EndOfStream`] when the source is exhausted before a
/// frame starts or before any body byte arrives, and the other
/// [`DecodeError`] variants for structural problems.
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Event, DecodeError> {
    let mut header = [0_u8; FRAME_HEADER_LEN];
    let received = read_full(reader, &mut header).map_err(DecodeError::io)?;
    if received == 0 {
        return Err(DecodeError::EndOfStream);
    }
    if received < FRAME_HEADER_LEN {
        return Err(DecodeError::header(format!(
            "read {received} of {FRAME_HEADER_LEN} header bytes"
        )));
    }
    let frame_header = parse_frame_header(&header)?;
    if frame_header.version != PROTOCOL_VERSION {
        // Drop the foreign body so the next read starts at a frame boundary.
        if let Ok(len) = frame_header.payload_len {
            let mut foreign = vec![0_u8; len];
            read_full(reader, &mut foreign).map_err(DecodeError::io)?;
        }
        return Err(DecodeError::UnsupportedProtocolVersion {
            found: frame_header.version.to_owned(),
            expected: PROTOCOL_VERSION,
        });
    }
    let payload_len = frame_header.payload_len?;
    if payload_len < BLOCK_HEADER_LEN {
        return Err(DecodeError::header(format!(
            "payload length {payload_len} is shorter than the block header"
        )));
    }

    let mut body = vec![0_u8; payload_len];
    let body_received = read_full(reader, &mut body).map_err(DecodeError::io)?;
    if body_received == 0 {
        return Err(DecodeError::EndOfStream);
    }
    if body_received < payload_len {
        return Err(DecodeError::TruncatedBody {
            expected: payload_len,
            received: body_received,
        });
    }
    parse_body(&body)
}

/// Decodes a frame held entirely in memory. Bytes after the frame are
/// ignored.
///
/// # Errors
///
/// As for [`decode`].
pub fn decode_slice(mut packet: &[u8]) -> Result<Event, DecodeError> {
    decode(&mut packet)
}

/// Writes one encoded frame to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`EncodeError`] when encoding or the write fails.
pub fn write_to_file(path: impl AsRef<Path>, event: &Event) -> Result<(), EncodeError> {
    let frame = encode(event)?;
    fs::write(path, frame).map_err(EncodeError::io)
}

/// Reads one frame from the start of the file at `path`.
///
/// # Errors
///
/// Returns [`DecodeError::Io`] when the file cannot be opened, otherwise as
/// for [`decode`].
pub fn read_from_file(path: impl AsRef<Path>) -> Result<Event, DecodeError> {
    let file = File::open(path).map_err(DecodeError::io)?;
    decode(&mut BufReader::new(file))
}

/// Fills `buf` from `reader`, stopping early only at end of stream.
///
/// Returns the number of bytes read. Interrupted reads are retried.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while let Some(remaining) = buf.get_mut(filled..) {
        if remaining.is_empty() {
            break;
        }
        match reader.read(remaining) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

/// Fields of the frame header line.
struct FrameHeader<'a> {
    version: &'a str,
    /// Kept apart from the version so a foreign frame can still be skipped.
    payload_len: Result<usize, DecodeError>,
}

fn parse_frame_header(header: &[u8]) -> Result<FrameHeader<'_>, DecodeError> {
    let text = str::from_utf8(header)
        .map_err(|_| DecodeError::header("frame header is not ASCII"))?;
    let after_marker = text
        .strip_prefix(FRAME_MARKER)
        .ok_or_else(|| DecodeError::header(format!("missing frame marker in {text:?}")))?;
    let (version, tail) = after_marker
        .split_once(':')
        .ok_or_else(|| DecodeError::header(format!("missing length separator in {text:?}")))?;
    let payload_len = tail
        .strip_suffix('\n')
        .filter(|d| d.len() == 6 && d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| DecodeError::header(format!("invalid payload length in {text:?}")))
        .and_then(|digits| {
            digits
                .parse::<usize>()
                .map_err(|_| DecodeError::header(format!("invalid payload length {digits:?}")))
        });
    Ok(FrameHeader {
        version,
        payload_len,
    })
}

/// Section lengths recovered from the block header.
struct SectionLengths([usize; SECTION_COUNT]);

impl SectionLengths {
    fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        let block = body
            .get(..BLOCK_HEADER_LEN)
            .and_then(|bytes| str::from_utf8(bytes).ok())
            .ok_or_else(|| DecodeError::body("block header missing or not ASCII"))?;
        let captures = BLOCK_HEADER
            .captures(block)
            .ok_or_else(|| DecodeError::body(format!("failed to parse block header {block:?}")))?;
        let field = |index: usize| -> usize {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or_default()
        };

        let count = field(1);
        if count != SECTION_COUNT {
            return Err(DecodeError::body(format!(
                "expected {SECTION_COUNT} sections, found {count}"
            )));
        }
        let lengths = [field(2), field(3), field(4), field(5)];
        let [routing_len, ..] = lengths;
        if routing_len == 0 {
            return Err(DecodeError::body("routing section cannot be empty"));
        }
        let declared = BLOCK_HEADER_LEN + lengths.iter().sum::<usize>();
        if declared != body.len() {
            return Err(DecodeError::body(format!(
                "section lengths total {declared} bytes but payload is {} bytes",
                body.len()
            )));
        }
        Ok(Self(lengths))
    }
}

fn parse_body(body: &[u8]) -> Result<Event, DecodeError> {
    let SectionLengths(lengths) = SectionLengths::parse(body)?;
    let mut offset = BLOCK_HEADER_LEN;
    let [part1, part2, system, exec] = lengths.map(|len| {
        let section = body.get(offset..offset + len).unwrap_or_default();
        offset += len;
        section
    });

    let mut routing_map: Map<String, Value> =
        serde_json::from_slice(part1).map_err(|e| DecodeError::section(ROUTING, e))?;
    let type_code = routing_map
        .remove(EVENT_TYPE_KEY)
        .ok_or_else(|| DecodeError::body("routing section has no eventType"))?;
    let event_type = int_from_value(&type_code)
        .and_then(EventType::from_code)
        .ok_or_else(|| DecodeError::body(format!("unknown event type {type_code}")))?;
    let routing: Routing = serde_json::from_value(Value::Object(routing_map))
        .map_err(|e| DecodeError::section(ROUTING, e))?;

    let mut event = Event::new(event_type);
    event.routing = routing;
    event.metadata = parse_section::<Metadata>(part2, METADATA)?;
    event.system = parse_section::<SystemParams>(system, SYSTEM)?;
    event.exec = parse_section::<ExecParams>(exec, EXEC)?;
    Ok(event)
}

fn parse_section<T>(bytes: &[u8], section: &'static str) -> Result<T, DecodeError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| DecodeError::section(section, e))
}
