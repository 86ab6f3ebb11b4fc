use std::fmt;

/// Why a frame was judged corrupt.
///
/// Corrupt frames are fatal to the current exchange; the decoder makes no
/// attempt to resynchronize on the next `START_OF_BLOCK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptKind {
    /// A second `START_OF_BLOCK` arrived before the frame ended.
    StartOfBlockInsideFrame,
    /// The stream ended before `END_OF_BLOCK`.
    EndOfStreamInsideFrame,
    /// `END_OF_BLOCK` was not immediately followed by `END_OF_DATA`.
    MissingEndOfData,
}

impl fmt::Display for CorruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CorruptKind::StartOfBlockInsideFrame => "received START_OF_BLOCK before END_OF_BLOCK",
            CorruptKind::EndOfStreamInsideFrame => "reached end of stream before END_OF_BLOCK",
            CorruptKind::MissingEndOfData => "END_OF_BLOCK was not followed by END_OF_DATA",
        };
        f.write_str(reason)
    }
}

/// Errors that can occur while reading or writing MLLP frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A framing invariant was violated.
    #[error("corrupt frame: {0}")]
    Corrupt(CorruptKind),

    /// The read timeout expired after a frame had started but before it
    /// completed. The buffered partial payload is lost.
    #[error("timed out mid-frame ({buffered} payload byte(s) buffered)")]
    Timeout { buffered: usize },

    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for framing-invariant violations (as opposed to I/O trouble).
    pub fn is_corrupt(&self) -> bool {
        matches!(self, FrameError::Corrupt(_))
    }

    /// True for mid-frame timeout expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrameError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
