use std::io::{ErrorKind, Read};

use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

use crate::codec::{ReadOutcome, END_OF_BLOCK, END_OF_DATA, START_OF_BLOCK};
use crate::error::{CorruptKind, FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Frame boundary scanner state.
enum ScanState {
    /// Waiting for `START_OF_BLOCK`; out-of-band bytes are discarded.
    AwaitStart,
    /// Inside a frame, collecting payload bytes until `END_OF_BLOCK`.
    Accumulate,
    /// `END_OF_BLOCK` seen; the next byte must be `END_OF_DATA`.
    Confirm,
}

/// Reads complete MLLP frames from any `Read` stream.
///
/// Bytes pulled off the stream but not consumed by the current frame are
/// carried over to the next call, so the stream is consumed exactly once no
/// matter how reads and frame boundaries interleave.
///
/// Read-timeout behavior depends on where the scanner is: a timeout before a
/// frame has started is a clean [`ReadOutcome::Idle`]; a timeout mid-frame is
/// a [`FrameError::Timeout`], because buffered data would be silently lost
/// otherwise.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Read> FrameReader<T> {
    /// Create a frame reader over a stream.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read the next complete frame (blocking, bounded by the stream's read
    /// timeout if one is set).
    pub fn read_frame(&mut self) -> Result<ReadOutcome> {
        let mut state = ScanState::AwaitStart;
        let mut payload = BytesMut::new();

        loop {
            while !self.buf.is_empty() {
                let byte = self.buf.get_u8();
                match state {
                    ScanState::AwaitStart => {
                        if byte == START_OF_BLOCK {
                            state = ScanState::Accumulate;
                        } else {
                            warn!(byte, "discarding out-of-band byte before START_OF_BLOCK");
                        }
                    }
                    ScanState::Accumulate => match byte {
                        START_OF_BLOCK => {
                            return Err(FrameError::Corrupt(
                                CorruptKind::StartOfBlockInsideFrame,
                            ));
                        }
                        END_OF_BLOCK => state = ScanState::Confirm,
                        other => payload.put_u8(other),
                    },
                    ScanState::Confirm => {
                        if byte == END_OF_DATA {
                            return Ok(ReadOutcome::Message(payload.freeze()));
                        }
                        return Err(FrameError::Corrupt(CorruptKind::MissingEndOfData));
                    }
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => {
                    return match state {
                        ScanState::AwaitStart => Ok(ReadOutcome::Idle),
                        _ => Err(FrameError::Timeout {
                            buffered: payload.len(),
                        }),
                    };
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return match state {
                    ScanState::AwaitStart => Ok(ReadOutcome::Closed),
                    ScanState::Accumulate => {
                        Err(FrameError::Corrupt(CorruptKind::EndOfStreamInsideFrame))
                    }
                    ScanState::Confirm => Err(FrameError::Corrupt(CorruptKind::MissingEndOfData)),
                };
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
