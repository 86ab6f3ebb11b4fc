use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mllpsim_peer::{FaultPolicy, MllpServer, ModulusRule, PatternRule, ServerConfig};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        backlog: args.backlog,
        accept_timeout: parse_duration(&args.accept_timeout)?,
        max_bind_attempts: args.max_bind_attempts,
        read_timeout: parse_duration(&args.read_timeout)?,
        raise_on_accept_timeout: false,
        faults: build_policy(&args)?,
    };

    let mut server =
        MllpServer::start(config).map_err(|err| peer_error("server start failed", err))?;
    print_listening(server.local_addr(), format);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) && server.is_active() {
        std::thread::sleep(Duration::from_millis(100));
    }

    server.shutdown();
    Ok(SUCCESS)
}

fn build_policy(args: &ListenArgs) -> CliResult<FaultPolicy> {
    let mut faults = FaultPolicy {
        exclude_start_of_block: ModulusRule::new(args.exclude_start_of_block),
        exclude_end_of_block: ModulusRule::new(args.exclude_end_of_block),
        exclude_end_of_data: ModulusRule::new(args.exclude_end_of_data),
        exclude_acknowledgement: ModulusRule::new(args.exclude_acknowledgement),
        send_out_of_band_data: ModulusRule::new(args.out_of_band),
        disconnect_before_acknowledgement: ModulusRule::new(args.disconnect_before_ack),
        disconnect_after_acknowledgement: ModulusRule::new(args.disconnect_after_ack),
        reject_acknowledgement: ModulusRule::new(args.reject_ack),
        error_acknowledgement: ModulusRule::new(args.error_ack),
        ..FaultPolicy::default()
    };
    if let Some(pattern) = &args.reject_pattern {
        faults.reject_acknowledgement_pattern = compile_pattern("--reject-pattern", pattern)?;
    }
    if let Some(pattern) = &args.error_pattern {
        faults.error_acknowledgement_pattern = compile_pattern("--error-pattern", pattern)?;
    }
    Ok(faults)
}

fn compile_pattern(flag: &str, pattern: &str) -> CliResult<PatternRule> {
    PatternRule::compile(pattern)
        .map_err(|err| CliError::new(USAGE, format!("{flag} is not a valid pattern: {err}")))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
