use bytes::{BufMut, Bytes, BytesMut};

/// MLLP envelope start marker (VT).
pub const START_OF_BLOCK: u8 = 0x0b;
/// MLLP envelope payload-end marker (FS).
pub const END_OF_BLOCK: u8 = 0x1c;
/// MLLP frame terminator (CR); must immediately follow [`END_OF_BLOCK`].
pub const END_OF_DATA: u8 = 0x0d;
/// HL7 segment separator (CR). Same byte value as [`END_OF_DATA`],
/// different protocol layer.
pub const SEGMENT_DELIMITER: u8 = 0x0d;

/// Which envelope bytes to emit around a payload.
///
/// Every marker is independently suppressible — this is how fault injection
/// removes envelope bytes without touching client or server logic.
///
/// Wire format with all markers enabled:
/// ```text
/// ┌────────────────┬─────────┬──────────────┬─────────────┐
/// │ START_OF_BLOCK │ Payload │ END_OF_BLOCK │ END_OF_DATA │
/// │ 0x0B           │ N bytes │ 0x1C         │ 0x0D        │
/// └────────────────┴─────────┴──────────────┴─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// Emit the `START_OF_BLOCK` marker.
    pub start_of_block: bool,
    /// Emit the `END_OF_BLOCK` marker.
    pub end_of_block: bool,
    /// Emit the `END_OF_DATA` terminator.
    pub end_of_data: bool,
}

impl Envelope {
    /// The well-formed envelope: all markers present.
    pub const FULL: Envelope = Envelope {
        start_of_block: true,
        end_of_block: true,
        end_of_data: true,
    };
}

impl Default for Envelope {
    fn default() -> Self {
        Self::FULL
    }
}

/// Encode a payload into its MLLP envelope, honoring the inclusion flags.
pub fn encode_payload(payload: &[u8], envelope: Envelope, dst: &mut BytesMut) {
    dst.reserve(payload.len() + 3);
    if envelope.start_of_block {
        dst.put_u8(START_OF_BLOCK);
    }
    dst.put_slice(payload);
    if envelope.end_of_block {
        dst.put_u8(END_OF_BLOCK);
    }
    if envelope.end_of_data {
        dst.put_u8(END_OF_DATA);
    }
}

/// Outcome of one framed read.
///
/// Corrupt frames and mid-frame timeouts travel in the error channel
/// ([`crate::FrameError`]); everything that is *not* an error is an explicit
/// variant here, so callers must handle every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete, well-formed frame payload.
    Message(Bytes),
    /// The peer closed the stream between frames. Not an error.
    Closed,
    /// The read timeout expired between frames with nothing buffered.
    /// Polling semantics: no message available, nothing lost.
    Idle,
}

impl ReadOutcome {
    /// The payload, if this outcome carries one.
    pub fn into_message(self) -> Option<Bytes> {
        match self {
            ReadOutcome::Message(payload) => Some(payload),
            _ => None,
        }
    }

    /// True if the peer closed the stream cleanly.
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadOutcome::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_envelope_wire_layout() {
        let mut buf = BytesMut::new();
        encode_payload(b"MSH|^~\\&|A", Envelope::FULL, &mut buf);

        assert_eq!(buf[0], START_OF_BLOCK);
        assert_eq!(&buf[1..buf.len() - 2], b"MSH|^~\\&|A");
        assert_eq!(buf[buf.len() - 2], END_OF_BLOCK);
        assert_eq!(buf[buf.len() - 1], END_OF_DATA);
    }

    #[test]
    fn each_marker_is_independently_suppressible() {
        let cases = [
            (Envelope { start_of_block: false, ..Envelope::FULL }, b"p\x1c\x0d".as_ref()),
            (Envelope { end_of_block: false, ..Envelope::FULL }, b"\x0bp\x0d".as_ref()),
            (Envelope { end_of_data: false, ..Envelope::FULL }, b"\x0bp\x1c".as_ref()),
        ];

        for (envelope, expected) in cases {
            let mut buf = BytesMut::new();
            encode_payload(b"p", envelope, &mut buf);
            assert_eq!(buf.as_ref(), expected, "envelope {envelope:?}");
        }
    }

    #[test]
    fn empty_payload_still_framed() {
        let mut buf = BytesMut::new();
        encode_payload(b"", Envelope::FULL, &mut buf);
        assert_eq!(buf.as_ref(), &[START_OF_BLOCK, END_OF_BLOCK, END_OF_DATA]);
    }

    #[test]
    fn bare_payload_when_all_markers_suppressed() {
        let envelope = Envelope {
            start_of_block: false,
            end_of_block: false,
            end_of_data: false,
        };
        let mut buf = BytesMut::new();
        encode_payload(b"naked", envelope, &mut buf);
        assert_eq!(buf.as_ref(), b"naked");
    }
}
