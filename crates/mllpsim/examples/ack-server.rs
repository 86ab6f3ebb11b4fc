//! Minimal acknowledging MLLP server on an ephemeral port.
//!
//! Run with:
//!   cargo run --example ack-server
//!
//! In another terminal, exchange a message with it:
//!   cargo run --features cli -- send <port> \
//!     --data 'MSH|^~\&|ADT|HOSP|LAB|HOSP|20250101||ADT^A01|1234|P|2.6'

use mllpsim::peer::{MllpServer, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = MllpServer::start(ServerConfig {
        host: "127.0.0.1".to_string(),
        ..ServerConfig::default()
    })?;
    eprintln!("listening on 127.0.0.1:{}", server.port());
    eprintln!("every message is answered with an AA acknowledgement; ^C to stop");

    loop {
        std::thread::park();
    }
}
