use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a fault-injecting MLLP server until interrupted.
    Listen(ListenArgs),
    /// Send one framed HL7 message and print the acknowledgement.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind; 0 requests an ephemeral port.
    #[arg(long, short = 'p', default_value_t = 0)]
    pub port: u16,

    /// Listen backlog.
    #[arg(long, default_value_t = 5)]
    pub backlog: u32,

    /// Accept timeout (e.g. 15s, 500ms); also the bind-retry backoff.
    #[arg(long, default_value = "15s")]
    pub accept_timeout: String,

    /// Per-connection read timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub read_timeout: String,

    /// Bind attempt ceiling for address-in-use conflicts.
    #[arg(long, default_value_t = 12)]
    pub max_bind_attempts: u32,

    /// Withhold START_OF_BLOCK from every n-th acknowledgement
    /// (0 = never, 1 = always).
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub exclude_start_of_block: i64,

    /// Withhold END_OF_BLOCK from every n-th acknowledgement.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub exclude_end_of_block: i64,

    /// Withhold END_OF_DATA from every n-th acknowledgement.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub exclude_end_of_data: i64,

    /// Withhold the acknowledgement body from every n-th response.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub exclude_acknowledgement: i64,

    /// Write out-of-band bytes before every n-th acknowledgement.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub out_of_band: i64,

    /// Disconnect before acknowledging every n-th message.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub disconnect_before_ack: i64,

    /// Disconnect after acknowledging every n-th message.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub disconnect_after_ack: i64,

    /// Answer every n-th message with an AR acknowledgement.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub reject_ack: i64,

    /// Answer every n-th message with an AE acknowledgement.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub error_ack: i64,

    /// Answer any message fully matching this pattern with AR.
    #[arg(long, value_name = "REGEX")]
    pub reject_pattern: Option<String>,

    /// Answer any message fully matching this pattern with AE.
    #[arg(long, value_name = "REGEX")]
    pub error_pattern: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Port to connect to.
    pub port: u16,

    /// Host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// HL7 message text. Line feeds are normalized to the HL7 segment
    /// delimiter (CR).
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,

    /// Read the message from a file, byte for byte.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,

    /// Withhold START_OF_BLOCK from the outbound frame.
    #[arg(long)]
    pub no_start_of_block: bool,

    /// Withhold END_OF_BLOCK from the outbound frame.
    #[arg(long)]
    pub no_end_of_block: bool,

    /// Withhold END_OF_DATA from the outbound frame.
    #[arg(long)]
    pub no_end_of_data: bool,

    /// Deliver the frame across multiple packets, flushing at each segment
    /// delimiter.
    #[arg(long)]
    pub chunked: bool,

    /// Acknowledgement timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,

    /// Send only; do not wait for an acknowledgement.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
