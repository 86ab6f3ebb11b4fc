//! Scriptable MLLP client and server test doubles.
//!
//! This is the "stand up a peer in a test" layer. The server acknowledges
//! every inbound HL7 message and can be scheduled — per message count or
//! message content — to corrupt its responses in most of the ways a
//! misbehaving production peer has been seen to: withheld envelope bytes,
//! suppressed acknowledgement bodies, out-of-band noise, premature
//! disconnects, and negative acknowledgements. The client can emit the same
//! malformed traffic in the other direction.

pub mod client;
pub mod error;
pub mod fault;
pub mod server;

pub use client::{ClientConfig, MllpClient};
pub use error::{PeerError, Result};
pub use fault::{FaultDecision, FaultPolicy, ModulusRule, PatternRule};
pub use server::{MllpServer, ServerConfig};
