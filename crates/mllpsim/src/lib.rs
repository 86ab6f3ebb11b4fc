//! Scriptable MLLP test-double peers.
//!
//! An umbrella over the `mllpsim-*` crates: MLLP envelope framing, HL7
//! acknowledgement generation, and client/server peers whose misbehavior is
//! scheduled deterministically per message count or message content.
//!
//! ```no_run
//! use mllpsim::peer::{ClientConfig, FaultPolicy, MllpClient, MllpServer, ServerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MllpServer::start(ServerConfig {
//!     host: "127.0.0.1".to_string(),
//!     faults: FaultPolicy::default(),
//!     ..ServerConfig::default()
//! })?;
//!
//! let mut client = MllpClient::new(ClientConfig::for_port(server.port()))?;
//! let ack = client.send_framed_and_wait_for_ack(b"MSH|^~\\&|A|B|C|D|1||ADT^A01|42|P|2.2\r")?;
//! # let _ = ack;
//! # Ok(())
//! # }
//! ```

pub use mllpsim_frame as frame;
pub use mllpsim_hl7 as hl7;
pub use mllpsim_transport as transport;

#[cfg(feature = "peer")]
pub use mllpsim_peer as peer;
