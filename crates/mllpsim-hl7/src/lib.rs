//! HL7 acknowledgement generation for MLLP test peers.
//!
//! Just enough HL7 to acknowledge a message: split the MSH header on its own
//! declared field separator, re-address it back at the sender, and attach an
//! MSA segment carrying the requested code and the original control id.
//! This is deliberately not an HL7 parser.

pub mod ack;
pub mod error;

pub use ack::{generate_acknowledgement, AckCode, DEFAULT_NACK, SEGMENT_DELIMITER};
pub use error::{Hl7Error, Result};
