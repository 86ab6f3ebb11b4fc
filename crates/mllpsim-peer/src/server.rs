use std::collections::HashMap;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use mllpsim_frame::{FrameReader, FrameWriter, ReadOutcome};
use mllpsim_hl7::generate_acknowledgement;
use mllpsim_transport::{MllpListener, MllpStream};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::fault::FaultPolicy;

/// Bytes injected before the envelope when the out-of-band fault triggers.
const OUT_OF_BAND_DATA: &[u8] = b"OUT-OF-BAND-DATA";

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port; 0 requests an ephemeral port from the OS.
    pub port: u16,
    /// Listen backlog.
    pub backlog: u32,
    /// Bound on each accept wait; also the backoff between bind attempts.
    pub accept_timeout: Duration,
    /// Bind attempt ceiling for address-in-use conflicts. Exceeding it
    /// propagates the bind error.
    pub max_bind_attempts: u32,
    /// Read timeout applied to every accepted connection.
    pub read_timeout: Duration,
    /// Treat an accept timeout as fatal to the accept loop instead of
    /// looping again.
    pub raise_on_accept_timeout: bool,
    /// Fault-injection schedule shared by all connections.
    pub faults: FaultPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            backlog: 5,
            accept_timeout: Duration::from_millis(15_000),
            max_bind_attempts: 12,
            read_timeout: Duration::from_millis(5000),
            raise_on_accept_timeout: false,
            faults: FaultPolicy::default(),
        }
    }
}

type Registry = HashMap<u64, MllpStream>;

/// A scriptable MLLP server.
///
/// One dedicated thread runs the accept loop; every accepted connection is
/// handled by an independent worker thread that reads frames, applies the
/// fault policy, and writes acknowledgements. Workers never block on each
/// other: the policy is shared read-only, and each worker exclusively owns
/// its socket and message counter.
#[derive(Debug)]
pub struct MllpServer {
    local_addr: SocketAddr,
    active: Arc<AtomicBool>,
    registry: Arc<Mutex<Registry>>,
    accept_thread: Option<JoinHandle<()>>,
}

impl MllpServer {
    /// Bind (retrying address-in-use conflicts up to the configured
    /// ceiling) and start accepting connections.
    pub fn start(config: ServerConfig) -> Result<Self> {
        let listener = bind_with_retry(&config)?;
        let local_addr = listener.local_addr();
        info!(%local_addr, "mllp server started");

        let active = Arc::new(AtomicBool::new(true));
        let registry: Arc<Mutex<Registry>> = Arc::new(Mutex::new(HashMap::new()));
        let faults = Arc::new(config.faults.clone());

        let accept_thread = {
            let active = Arc::clone(&active);
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                accept_loop(listener, &config, &active, &registry, &faults);
                active.store(false, Ordering::SeqCst);
            })
        };

        Ok(Self {
            local_addr,
            active,
            registry,
            accept_thread: Some(accept_thread),
        })
    }

    /// The effective listen port (resolves an ephemeral request).
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The effective listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True until [`shutdown`](Self::shutdown) or a fatal accept-loop error.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting and force-reset every open connection.
    ///
    /// Safe to call concurrently with in-flight accepts and reads, and
    /// idempotent. Blocked worker reads unblock immediately via the reset
    /// rather than waiting out their timeout.
    pub fn shutdown(&mut self) {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if was_active {
            info!(local_addr = %self.local_addr, "shutting down mllp server");
            // The accept loop is blocked for at most the accept timeout; a
            // throwaway local connection unblocks it immediately.
            let _ = std::net::TcpStream::connect(("127.0.0.1", self.local_addr.port()));
        }

        let drained: Vec<(u64, MllpStream)> =
            lock_registry(&self.registry).drain().collect();
        for (id, stream) in drained {
            debug!(id, "force-resetting connection");
            stream.reset();
        }

        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("accept thread panicked");
            }
        }
    }
}

impl Drop for MllpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bind_with_retry(config: &ServerConfig) -> Result<MllpListener> {
    let mut attempt = 0u32;
    loop {
        match MllpListener::bind(
            &config.host,
            config.port,
            config.backlog,
            Some(config.accept_timeout),
        ) {
            Ok(listener) => return Ok(listener),
            Err(err) if err.is_addr_in_use() && attempt < config.max_bind_attempts => {
                attempt += 1;
                warn!(
                    attempt,
                    max_attempts = config.max_bind_attempts,
                    backoff = ?config.accept_timeout,
                    "bind attempt failed, retrying"
                );
                std::thread::sleep(config.accept_timeout);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn accept_loop(
    listener: MllpListener,
    config: &ServerConfig,
    active: &Arc<AtomicBool>,
    registry: &Arc<Mutex<Registry>>,
    faults: &Arc<FaultPolicy>,
) {
    info!(port = listener.local_port(), "accepting connections");
    let mut next_connection_id = 0u64;

    while active.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(Some(stream)) => {
                if !active.load(Ordering::SeqCst) {
                    // Shutdown's wake-up connection; nothing to serve.
                    break;
                }
                next_connection_id += 1;
                if let Err(err) = spawn_worker(
                    next_connection_id,
                    stream,
                    config.read_timeout,
                    active,
                    registry,
                    faults,
                ) {
                    warn!(%err, "failed to start connection worker");
                }
            }
            Ok(None) => {
                if config.raise_on_accept_timeout {
                    error!("timed out waiting for a connection");
                    break;
                }
            }
            Err(err) => {
                if active.load(Ordering::SeqCst) {
                    warn!(%err, "accept failed");
                }
                break;
            }
        }
    }
    info!(port = listener.local_port(), "no longer accepting connections");
}

/// Everything a connection worker owns, handed over at spawn time.
struct WorkerContext {
    id: u64,
    stream: MllpStream,
    faults: Arc<FaultPolicy>,
    registry: Arc<Mutex<Registry>>,
    active: Arc<AtomicBool>,
}

fn spawn_worker(
    id: u64,
    stream: MllpStream,
    read_timeout: Duration,
    active: &Arc<AtomicBool>,
    registry: &Arc<Mutex<Registry>>,
    faults: &Arc<FaultPolicy>,
) -> Result<()> {
    stream.set_read_timeout(Some(read_timeout))?;
    lock_registry(registry).insert(id, stream.try_clone()?);

    let context = WorkerContext {
        id,
        stream,
        faults: Arc::clone(faults),
        registry: Arc::clone(registry),
        active: Arc::clone(active),
    };
    std::thread::Builder::new()
        .name(format!("mllp-conn-{id}"))
        .spawn(move || run_worker(context))
        .map_err(mllpsim_transport::TransportError::Io)?;
    Ok(())
}

fn run_worker(context: WorkerContext) {
    let peer = context.stream.peer_addr().ok();
    info!(id = context.id, ?peer, "handling connection");

    if let Err(err) = serve_connection(&context) {
        warn!(id = context.id, %err, "connection worker terminated");
    }

    lock_registry(&context.registry).remove(&context.id);
    info!(id = context.id, ?peer, "connection finished");
}

/// The per-connection exchange loop: read one frame, consult the fault
/// policy, acknowledge. Strictly sequential — the next frame is not read
/// until the response to the current one has been written or intentionally
/// skipped.
fn serve_connection(context: &WorkerContext) -> Result<()> {
    let mut reader = FrameReader::new(context.stream.try_clone()?);
    let mut writer = FrameWriter::new(BufWriter::new(context.stream.try_clone()?));
    let mut message_counter: u64 = 0;

    while context.active.load(Ordering::SeqCst) {
        let payload = match reader.read_frame()? {
            ReadOutcome::Message(payload) => payload,
            // No traffic within the read timeout; connections are
            // long-lived, keep polling.
            ReadOutcome::Idle => continue,
            ReadOutcome::Closed => {
                debug!(id = context.id, "peer closed the connection");
                return Ok(());
            }
        };
        if payload.is_empty() {
            continue;
        }

        message_counter += 1;
        let message = String::from_utf8_lossy(&payload).into_owned();
        let decision = context.faults.decide(message_counter, &message);

        if decision.disconnect_before_acknowledgement {
            warn!(
                id = context.id,
                counter = message_counter,
                "disconnecting before sending acknowledgement"
            );
            context.stream.shutdown_both();
            return Ok(());
        }

        let code = decision.ack_code();
        let acknowledgement = generate_acknowledgement(&message, code);

        if decision.send_out_of_band_data {
            warn!(
                id = context.id,
                counter = message_counter,
                "writing out-of-band bytes before the envelope"
            );
            writer.send_raw(OUT_OF_BAND_DATA)?;
        }

        let envelope = decision.envelope();
        if !envelope.start_of_block {
            warn!(id = context.id, "not sending START_OF_BLOCK");
        }
        if decision.exclude_acknowledgement {
            info!(id = context.id, "not sending acknowledgement body");
        }
        if !envelope.end_of_block {
            warn!(id = context.id, "not sending END_OF_BLOCK");
        }
        if !envelope.end_of_data {
            warn!(id = context.id, "not sending END_OF_DATA");
        }

        let body: &[u8] = if decision.exclude_acknowledgement {
            b""
        } else {
            acknowledgement.as_bytes()
        };
        writer.send(body, envelope)?;
        debug!(
            id = context.id,
            counter = message_counter,
            code = %code,
            "acknowledgement written"
        );

        if decision.disconnect_after_acknowledgement {
            info!(
                id = context.id,
                counter = message_counter,
                "closing connection after acknowledgement"
            );
            context.stream.shutdown_both();
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;

    use mllpsim_frame::{END_OF_BLOCK, END_OF_DATA, START_OF_BLOCK};

    use super::*;

    fn quick_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            accept_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            ..ServerConfig::default()
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![START_OF_BLOCK];
        bytes.extend_from_slice(payload);
        bytes.push(END_OF_BLOCK);
        bytes.push(END_OF_DATA);
        bytes
    }

    #[test]
    fn ephemeral_bind_resolves_a_real_port() {
        let server = MllpServer::start(quick_config()).unwrap();
        assert_ne!(server.port(), 0);
        assert!(server.is_active());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut server = MllpServer::start(quick_config()).unwrap();
        server.shutdown();
        assert!(!server.is_active());
        server.shutdown();
    }

    #[test]
    fn accept_timeout_loops_instead_of_failing() {
        let server = MllpServer::start(quick_config()).unwrap();
        // Let several accept timeouts elapse with no traffic.
        std::thread::sleep(Duration::from_millis(600));
        assert!(server.is_active());

        // The server must still take connections afterwards.
        let stream = TcpStream::connect(("127.0.0.1", server.port()));
        assert!(stream.is_ok());
    }

    #[test]
    fn bind_conflict_exhausts_attempts_and_propagates() {
        let occupant = MllpServer::start(quick_config()).unwrap();
        let config = ServerConfig {
            port: occupant.port(),
            accept_timeout: Duration::from_millis(20),
            max_bind_attempts: 2,
            ..quick_config()
        };

        let err = MllpServer::start(config).unwrap_err();
        assert!(
            matches!(
                &err,
                crate::error::PeerError::Transport(transport) if transport.is_addr_in_use()
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn worker_acknowledges_over_a_raw_socket() {
        let server = MllpServer::start(quick_config()).unwrap();
        let mut socket = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        socket
            .write_all(&frame(
                b"MSH|^~\\&|APP|FAC|PEER|SITE|20160101||ADT^A01|99|P|2.2\r",
            ))
            .unwrap();

        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            socket.read_exact(&mut byte).unwrap();
            response.push(byte[0]);
            if response.len() >= 2
                && response[response.len() - 2] == END_OF_BLOCK
                && response[response.len() - 1] == END_OF_DATA
            {
                break;
            }
        }

        assert_eq!(response[0], START_OF_BLOCK);
        let body = String::from_utf8_lossy(&response[1..response.len() - 2]).into_owned();
        assert!(body.contains("MSA|AA|99|"), "body: {body:?}");
    }

    #[test]
    fn shutdown_resets_open_connections() {
        let mut server = MllpServer::start(quick_config()).unwrap();
        let mut socket = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        // Give the accept loop a moment to register the connection.
        std::thread::sleep(Duration::from_millis(100));

        server.shutdown();

        let mut buf = [0u8; 1];
        match socket.read(&mut buf) {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("unexpected {n} bytes after shutdown"),
        }
    }
}
