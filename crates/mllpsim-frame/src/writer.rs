use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_payload, Envelope, END_OF_BLOCK, END_OF_DATA, START_OF_BLOCK};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 2 * 1024;

/// Writes MLLP frames (well-formed or deliberately malformed) to any `Write`
/// stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a frame writer over a stream.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Envelope and send a payload in one write, then flush.
    pub fn send(&mut self, payload: &[u8], envelope: Envelope) -> Result<()> {
        self.buf.clear();
        encode_payload(payload, envelope, &mut self.buf);
        write_all_retrying(&mut self.inner, &self.buf)?;
        self.flush()
    }

    /// Send raw bytes with no framing, then flush.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        write_all_retrying(&mut self.inner, bytes)?;
        self.flush()
    }

    /// Envelope and send a payload one byte at a time, flushing after every
    /// occurrence of `flush_byte`.
    ///
    /// Simulates a sender whose message arrives split across multiple TCP
    /// segments — e.g. one segment per HL7 segment when `flush_byte` is the
    /// segment delimiter.
    pub fn send_chunked(&mut self, payload: &[u8], flush_byte: u8, envelope: Envelope) -> Result<()> {
        if envelope.start_of_block {
            write_all_retrying(&mut self.inner, &[START_OF_BLOCK])?;
        }
        for &byte in payload {
            write_all_retrying(&mut self.inner, &[byte])?;
            if byte == flush_byte {
                flush_retrying(&mut self.inner)?;
            }
        }
        if envelope.end_of_block {
            write_all_retrying(&mut self.inner, &[END_OF_BLOCK])?;
        }
        if envelope.end_of_data {
            write_all_retrying(&mut self.inner, &[END_OF_DATA])?;
        }
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        flush_retrying(&mut self.inner)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn write_all_retrying<T: Write>(inner: &mut T, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match inner.write(buf) {
            Ok(0) => {
                return Err(FrameError::Io(std::io::Error::from(ErrorKind::WriteZero)));
            }
            Ok(n) => buf = &buf[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

fn flush_retrying<T: Write>(inner: &mut T) -> Result<()> {
    loop {
        match inner.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn send_produces_enveloped_bytes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(b"MSH|x", Envelope::FULL).unwrap();

        let written = writer.into_inner().into_inner();
        assert_eq!(written.first(), Some(&START_OF_BLOCK));
        assert_eq!(&written[1..6], b"MSH|x");
        assert_eq!(&written[6..], &[END_OF_BLOCK, END_OF_DATA]);
    }

    #[test]
    fn send_honors_suppressed_markers() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let envelope = Envelope {
            start_of_block: false,
            end_of_block: true,
            end_of_data: false,
        };
        writer.send(b"p", envelope).unwrap();

        let written = writer.into_inner().into_inner();
        assert_eq!(written, vec![b'p', END_OF_BLOCK]);
    }

    #[test]
    fn send_raw_writes_exactly_the_given_bytes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_raw(b"junk before a frame").unwrap();

        let written = writer.into_inner().into_inner();
        assert_eq!(written, b"junk before a frame");
    }

    #[test]
    fn chunked_send_flushes_at_flush_byte() {
        let mut writer = FrameWriter::new(FlushRecorder::default());
        writer
            .send_chunked(b"SEG1\rSEG2\rSEG3", b'\r', Envelope::FULL)
            .unwrap();

        let recorder = writer.into_inner();
        // One flush per delimiter plus the final flush.
        assert_eq!(recorder.flushes, 3);

        let mut expected = vec![START_OF_BLOCK];
        expected.extend_from_slice(b"SEG1\rSEG2\rSEG3");
        expected.push(END_OF_BLOCK);
        expected.push(END_OF_DATA);
        assert_eq!(recorder.written, expected);
    }

    #[test]
    fn chunked_send_respects_envelope_flags() {
        let mut writer = FrameWriter::new(FlushRecorder::default());
        let envelope = Envelope {
            start_of_block: true,
            end_of_block: false,
            end_of_data: false,
        };
        writer.send_chunked(b"ab", b'\r', envelope).unwrap();

        let recorder = writer.into_inner();
        assert_eq!(recorder.written, vec![START_OF_BLOCK, b'a', b'b']);
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = FrameWriter::new(OneBytePerWrite::default());
        writer.send(b"drips", Envelope::FULL).unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.written.len(), 5 + 3);
    }

    #[derive(Default)]
    struct FlushRecorder {
        written: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushRecorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct OneBytePerWrite {
        written: Vec<u8>,
    }

    impl Write for OneBytePerWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
