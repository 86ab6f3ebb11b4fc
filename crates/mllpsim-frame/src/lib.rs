//! MLLP envelope framing for scriptable test peers.
//!
//! MLLP wraps each HL7 message in a three-byte envelope:
//! `0x0B` (start of block), the payload, `0x1C` (end of block), `0x0D`
//! (end of data). Markers are not escaped — HL7 payloads use CR as their
//! segment delimiter, which is distinct from the envelope bytes by protocol
//! convention.
//!
//! The encoder can withhold any envelope byte and the writer can fragment a
//! send at a chosen flush byte, so tests can put deliberately malformed
//! traffic on the wire. The decoder is strict: framing violations fail fast
//! with no resynchronization.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_payload, Envelope, ReadOutcome, END_OF_BLOCK, END_OF_DATA, SEGMENT_DELIMITER,
    START_OF_BLOCK,
};
pub use error::{CorruptKind, FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
