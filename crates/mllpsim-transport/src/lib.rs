//! TCP transport for scriptable MLLP test peers.
//!
//! Thin layer over `std::net` adding the pieces an MLLP test double needs:
//! connect with a bounded timeout and address context on failure, a listener
//! with a configurable backlog and a bounded accept wait, and the socket
//! options (`SO_LINGER`, `SO_REUSEADDR`) used to simulate abrupt peer
//! termination.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::MllpStream;
pub use tcp::{connect_stream, MllpListener};
