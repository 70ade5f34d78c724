//! Event model and framed wire codec for txProc workers.
//!
//! A txProc worker exchanges [`Event`] values with its supervising process.
//! Each event carries four JSON sections (routing, metadata, system
//! parameters and execution parameters) which the [`codec`] frames behind two
//! fixed-width ASCII headers:
//!
//! ```text
//! #frameNewframe#v3.0:000088
//! 04,1,000032,1,000002,1,000013,1,000002
//! {"eventType":8,"reference":"r1"}{}{"command":1}{}
//! ```
//!
//! The first line declares the protocol version and the byte length of
//! everything that follows it. The second line declares the length of each
//! section; the decoder slices the body by those lengths rather than scanning
//! for delimiters.
//!
//! # Example
//!
//! ```
//! use txproc_wire::{CommandType, Event, EventType, codec};
//!
//! let mut event = Event::new(EventType::Command);
//! event.set_reference("r1");
//! event.set_command(CommandType::Stats);
//!
//! let bytes = codec::encode(&event).expect("encode");
//! let decoded = codec::decode_slice(&bytes).expect("decode");
//! assert_eq!(decoded.command(), Some(CommandType::Stats));
//! ```
//!
//! Stream connections to the supervisor open with a short banner; see
//! [`Greeting`].

pub mod codec;
pub mod error;
pub mod event;
pub mod greeting;

pub use self::codec::{
    BLOCK_HEADER_LEN, FRAME_HEADER_LEN, FRAME_MARKER, MAX_DATAGRAM_LEN, MAX_PAYLOAD_LEN,
    PROTOCOL_VERSION, SECTION_COUNT, decode, decode_slice, encode, read_from_file, write_to_file,
};
pub use self::error::{DecodeError, EncodeError, ExecModeError, GreetingError};
pub use self::event::{
    CommandType, Event, EventType, ExecMode, ExecParams, Metadata, Routing, SystemParams,
};
pub use self::greeting::Greeting;
