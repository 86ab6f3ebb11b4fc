/// Errors that can occur in MLLP peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (connect, bind, accept, socket options).
    #[error("transport error: {0}")]
    Transport(#[from] mllpsim_transport::TransportError),

    /// Frame-level error (corrupt frame, mid-frame timeout, stream I/O).
    #[error("frame error: {0}")]
    Frame(#[from] mllpsim_frame::FrameError),

    /// A fault pattern failed to compile.
    #[error("invalid fault pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// An operation that needs a live connection was called without one.
    #[error("client is not connected")]
    NotConnected,
}

impl PeerError {
    /// True when the underlying cause is a corrupt MLLP frame.
    pub fn is_corrupt_frame(&self) -> bool {
        matches!(self, PeerError::Frame(err) if err.is_corrupt())
    }

    /// True when the underlying cause is a mid-frame timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PeerError::Frame(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
