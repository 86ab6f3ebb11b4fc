#![cfg(feature = "cli")]

//! Drives the compiled `mllpsim` binary against in-process peers.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use mllpsim::peer::{ClientConfig, FaultPolicy, MllpClient, MllpServer, ServerConfig};

const ORU_R01: &str = "MSH|^~\\&|LAB|HOSP|EMR|HOSP|20250101||ORU^R01|777|P|2.6\nOBX|1||GLU^Glucose||182|mg/dl\n";

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mllpsim"))
}

/// Kills the child process even when an assertion panics first.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn test_server(faults: FaultPolicy) -> MllpServer {
    MllpServer::start(ServerConfig {
        host: "127.0.0.1".to_string(),
        accept_timeout: Duration::from_millis(500),
        read_timeout: Duration::from_millis(500),
        faults,
        ..ServerConfig::default()
    })
    .expect("server should start")
}

#[test]
fn version_prints_the_crate_version() {
    let output = bin().arg("version").output().expect("binary should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_prints_the_acknowledgement() {
    let server = test_server(FaultPolicy::default());

    let output = bin()
        .args([
            "send",
            &server.port().to_string(),
            "--data",
            ORU_R01,
            "--format",
            "text",
        ])
        .output()
        .expect("binary should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MSA|AA|777|"), "stdout: {stdout}");
}

#[test]
fn send_reports_a_withheld_acknowledgement_as_failure() {
    let faults = FaultPolicy {
        disconnect_before_acknowledgement: mllpsim::peer::ModulusRule::ALWAYS,
        ..FaultPolicy::default()
    };
    let server = test_server(faults);

    let output = bin()
        .args([
            "send",
            &server.port().to_string(),
            "--data",
            ORU_R01,
            "--timeout",
            "1s",
        ])
        .output()
        .expect("binary should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("without acknowledging"),
        "stderr: {stderr}"
    );
}

#[test]
fn listen_process_serves_an_in_process_client() {
    let child = bin()
        .args([
            "listen",
            "--host",
            "127.0.0.1",
            "--format",
            "json",
            "--accept-timeout",
            "500ms",
            "--read-timeout",
            "500ms",
        ])
        .stdout(Stdio::piped())
        .spawn()
        .expect("binary should spawn");
    let mut guard = ChildGuard(child);

    let stdout = guard.0.stdout.take().expect("stdout should be piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("listen should announce its port");
    let announcement: serde_json::Value =
        serde_json::from_str(line.trim()).expect("announcement should be JSON");
    assert_eq!(announcement["event"], "listening");
    let port = announcement["port"].as_u64().expect("port field") as u16;

    let mut client = MllpClient::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        read_timeout: Duration::from_millis(2000),
        ..ClientConfig::for_port(port)
    })
    .expect("client should connect");

    let outcome = client
        .send_framed_and_wait_for_ack(ORU_R01.replace('\n', "\r").as_bytes())
        .expect("round trip should succeed");
    let ack = outcome.into_message().expect("an acknowledgement frame");
    let ack = String::from_utf8_lossy(&ack);
    assert!(ack.contains("MSA|AA|777|"), "ack: {ack}");
}
