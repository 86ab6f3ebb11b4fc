use std::fs;

use mllpsim_frame::{Envelope, ReadOutcome, SEGMENT_DELIMITER};
use mllpsim_peer::{ClientConfig, MllpClient};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_ack, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let config = ClientConfig {
        host: args.host.clone(),
        port: args.port,
        read_timeout: timeout,
        envelope: Envelope {
            start_of_block: !args.no_start_of_block,
            end_of_block: !args.no_end_of_block,
            end_of_data: !args.no_end_of_data,
        },
        ..ClientConfig::default()
    };
    let mut client = MllpClient::new(config).map_err(|err| peer_error("connect failed", err))?;

    if args.chunked {
        client.send_framed_in_chunks(&payload, SEGMENT_DELIMITER, false)
    } else {
        client.send_framed(&payload, false)
    }
    .map_err(|err| peer_error("send failed", err))?;

    if args.no_wait {
        return Ok(SUCCESS);
    }

    let outcome = client
        .receive_framed_within(timeout)
        .map_err(|err| peer_error("receive failed", err))?;
    match outcome {
        ReadOutcome::Message(payload) => {
            print_ack(&String::from_utf8_lossy(&payload), format);
            Ok(SUCCESS)
        }
        ReadOutcome::Closed => Err(CliError::new(
            FAILURE,
            "peer closed the connection without acknowledging",
        )),
        ReadOutcome::Idle => Err(CliError::new(
            TIMEOUT,
            "no acknowledgement arrived within the timeout",
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        // Shells deal in line feeds; HL7 wants carriage returns.
        return Ok(data.replace('\n', "\r").into_bytes());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| crate::exit::io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --data or --file is required"))
}
