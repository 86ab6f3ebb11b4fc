use std::io::{IsTerminal, Write};
use std::net::SocketAddr;

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Text
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct AckOutput<'a> {
    event: &'a str,
    payload: &'a str,
    payload_size: usize,
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'a str,
    host: String,
    port: u16,
}

/// Print a received acknowledgement.
pub fn print_ack(ack: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = AckOutput {
                event: "acknowledgement",
                payload: ack,
                payload_size: ack.len(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        // HL7 uses CR as its segment separator; swap it for LF so segments
        // land on their own terminal lines.
        OutputFormat::Text => println!("{}", ack.replace('\r', "\n")),
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = out.write_all(ack.as_bytes());
            let _ = out.flush();
        }
    }
}

/// Announce the listening address of a started server.
pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                host: addr.ip().to_string(),
                port: addr.port(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text | OutputFormat::Raw => println!("listening on {addr}"),
    }
    // Downstream scripts wait for this line before connecting.
    let _ = std::io::stdout().flush();
}
