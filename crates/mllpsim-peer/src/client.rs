use std::io::{BufWriter, Read};
use std::time::Duration;

use mllpsim_frame::{Envelope, FrameReader, FrameWriter, ReadOutcome};
use mllpsim_transport::{connect_stream, MllpStream};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Peer host to dial.
    pub host: String,
    /// Peer port to dial.
    pub port: u16,
    /// Bound on connection establishment.
    pub connect_timeout: Duration,
    /// Default bound on framed receives.
    pub read_timeout: Duration,
    /// Set `SO_REUSEADDR` on the client socket.
    pub reuse_address: bool,
    /// Disable Nagle's algorithm.
    pub tcp_no_delay: bool,
    /// Defer dialing until the first send instead of connecting at
    /// construction time.
    pub lazy_connect: bool,
    /// Envelope markers emitted by framed sends. Suppressing individual
    /// markers lets a test put a malformed *outbound* frame on the wire.
    pub envelope: Envelope,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(5000),
            reuse_address: false,
            tcp_no_delay: true,
            lazy_connect: false,
            envelope: Envelope::FULL,
        }
    }
}

impl ClientConfig {
    /// Default settings pointed at a local port.
    pub fn for_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

struct Connection {
    /// Control handle for socket options, reset and shutdown. The reader
    /// and writer hold their own clones of the same socket.
    stream: MllpStream,
    reader: FrameReader<MllpStream>,
    writer: FrameWriter<BufWriter<MllpStream>>,
}

/// A scriptable MLLP client owning at most one TCP connection.
///
/// All operations block; read timeouts are the only bound on a blocked
/// receive. The client moves between `Disconnected` and `Connected`
/// explicitly — [`disconnect`](Self::disconnect) is safe from any state,
/// including error cleanup paths.
pub struct MllpClient {
    config: ClientConfig,
    connection: Option<Connection>,
    /// Framed units of work (sent or received) on the current connection.
    message_counter: u64,
}

impl MllpClient {
    /// Create a client. Unless `lazy_connect` is set (or no port is
    /// configured), the connection is dialed immediately.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut client = Self {
            config,
            connection: None,
            message_counter: 0,
        };
        if client.config.port > 0 && !client.config.lazy_connect {
            client.connect()?;
        }
        Ok(client)
    }

    /// Dial the configured peer, replacing any existing connection.
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();

        let stream = connect_stream(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        )?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_nodelay(self.config.tcp_no_delay)?;
        stream.set_reuse_address(self.config.reuse_address)?;
        stream.clear_linger()?;

        let reader = FrameReader::new(stream.try_clone()?);
        let writer = FrameWriter::new(BufWriter::new(stream.try_clone()?));
        self.connection = Some(Connection {
            stream,
            reader,
            writer,
        });
        // The counter survives everything except a reconnect.
        self.message_counter = 0;
        Ok(())
    }

    /// Close the connection gracefully. Idempotent; never fails — cleanup
    /// problems are logged, not raised.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(
                host = %self.config.host,
                port = self.config.port,
                "closing connection"
            );
            drop(connection);
        }
    }

    /// Force a TCP reset instead of a graceful close — simulates abrupt
    /// peer termination. Idempotent, like [`disconnect`](Self::disconnect).
    pub fn reset(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.stream.reset();
            drop(connection);
        }
    }

    /// True only while a live socket is held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Write raw bytes (no framing), auto-connecting if necessary.
    pub fn send(&mut self, bytes: &[u8], disconnect_after: bool) -> Result<()> {
        let connection = self.ensure_connected()?;
        connection.writer.send_raw(bytes)?;
        self.finish_send(disconnect_after);
        Ok(())
    }

    /// Write raw text (no framing), auto-connecting if necessary.
    pub fn send_str(&mut self, text: &str, disconnect_after: bool) -> Result<()> {
        self.send(text.as_bytes(), disconnect_after)
    }

    /// Write an MLLP-framed payload, honoring the configured envelope
    /// inclusion flags.
    pub fn send_framed(&mut self, payload: &[u8], disconnect_after: bool) -> Result<()> {
        let envelope = self.config.envelope;
        warn_suppressed_markers(envelope);
        let connection = self.ensure_connected()?;
        connection.writer.send(payload, envelope)?;
        self.message_counter += 1;
        self.finish_send(disconnect_after);
        Ok(())
    }

    /// Write an MLLP-framed payload one byte at a time, flushing whenever
    /// `flush_byte` occurs in the payload — delivers the message across
    /// multiple TCP segments.
    pub fn send_framed_in_chunks(
        &mut self,
        payload: &[u8],
        flush_byte: u8,
        disconnect_after: bool,
    ) -> Result<()> {
        let envelope = self.config.envelope;
        warn_suppressed_markers(envelope);
        let connection = self.ensure_connected()?;
        connection.writer.send_chunked(payload, flush_byte, envelope)?;
        self.message_counter += 1;
        self.finish_send(disconnect_after);
        Ok(())
    }

    /// Receive one framed payload, bounded by the configured read timeout.
    pub fn receive_framed(&mut self) -> Result<ReadOutcome> {
        self.receive_framed_within(self.config.read_timeout)
    }

    /// Receive one framed payload with an explicit timeout.
    ///
    /// `ReadOutcome::Closed` means the peer closed the stream cleanly while
    /// idle — not an error. Mid-frame timeouts and framing violations are
    /// errors.
    pub fn receive_framed_within(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        let connection = self.connection.as_mut().ok_or(PeerError::NotConnected)?;
        connection.stream.set_read_timeout(Some(timeout))?;
        let outcome = connection.reader.read_frame()?;
        match &outcome {
            ReadOutcome::Message(_) => self.message_counter += 1,
            ReadOutcome::Closed => {
                debug!("peer closed the stream while idle");
                self.disconnect();
            }
            ReadOutcome::Idle => {}
        }
        Ok(outcome)
    }

    /// Wait up to `timeout` for any bytes, framed or not, then return
    /// everything that has arrived. An empty result means the wait expired
    /// with no traffic.
    pub fn receive_available(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut collected = Vec::new();
        {
            let connection = self.connection.as_mut().ok_or(PeerError::NotConnected)?;
            connection.stream.set_read_timeout(Some(timeout))?;
            let mut chunk = [0u8; 2048];
            match connection.reader.get_mut().read(&mut chunk) {
                Ok(n) => collected.extend_from_slice(&chunk[..n]),
                Err(err) if is_timeout(&err) => return Ok(collected),
                Err(err) => return Err(PeerError::Frame(err.into())),
            }
        }
        let mut rest = self.drain_available()?;
        collected.append(&mut rest);
        Ok(collected)
    }

    /// Consume and return whatever bytes are already pending on the socket
    /// without waiting for more.
    pub fn drain_available(&mut self) -> Result<Vec<u8>> {
        let connection = self.connection.as_mut().ok_or(PeerError::NotConnected)?;
        connection
            .stream
            .set_read_timeout(Some(Duration::from_millis(10)))?;

        let mut collected = Vec::new();
        let mut chunk = [0u8; 2048];
        loop {
            match connection.reader.get_mut().read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&chunk[..n]),
                Err(err) if is_timeout(&err) => break,
                Err(err) => return Err(PeerError::Frame(err.into())),
            }
        }
        Ok(collected)
    }

    /// Send one framed payload and block for the acknowledgement — the
    /// primary round-trip assertion entry point.
    pub fn send_framed_and_wait_for_ack(&mut self, payload: &[u8]) -> Result<ReadOutcome> {
        self.send_framed_and_wait_for_ack_within(payload, self.config.read_timeout)
    }

    /// Send one framed payload and block for the acknowledgement with an
    /// explicit receive timeout.
    pub fn send_framed_and_wait_for_ack_within(
        &mut self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.send_framed(payload, false)?;
        self.receive_framed_within(timeout)
    }

    /// The settings this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Framed messages sent or received since the last (re)connect.
    pub fn message_count(&self) -> u64 {
        self.message_counter
    }

    /// Change the envelope markers used by subsequent framed sends.
    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.config.envelope = envelope;
    }

    fn ensure_connected(&mut self) -> Result<&mut Connection> {
        if self.connection.is_none() {
            self.connect()?;
        }
        self.connection.as_mut().ok_or(PeerError::NotConnected)
    }

    fn finish_send(&mut self, disconnect_after: bool) {
        if disconnect_after {
            warn!("closing connection immediately after send");
            self.disconnect();
        }
    }
}

impl Drop for MllpClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn warn_suppressed_markers(envelope: Envelope) {
    if !envelope.start_of_block {
        warn!("not sending START_OF_BLOCK");
    }
    if !envelope.end_of_block {
        warn!("not sending END_OF_BLOCK");
    }
    if !envelope.end_of_data {
        warn!("not sending END_OF_DATA");
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    use mllpsim_frame::{END_OF_BLOCK, END_OF_DATA, START_OF_BLOCK};

    use super::*;

    /// Minimal raw TCP peer for exercising the client without a real server.
    fn raw_peer<F>(behavior: F) -> (u16, JoinHandle<Vec<u8>>)
    where
        F: FnOnce(&mut TcpStream) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            behavior(&mut stream)
        });
        (port, handle)
    }

    fn read_exactly(stream: &mut TcpStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    fn local_config(port: u16) -> ClientConfig {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            read_timeout: Duration::from_millis(500),
            ..ClientConfig::for_port(port)
        }
    }

    #[test]
    fn connects_eagerly_by_default() {
        let (port, peer) = raw_peer(|_stream| Vec::new());
        let client = MllpClient::new(local_config(port)).unwrap();
        assert!(client.is_connected());
        drop(client);
        peer.join().unwrap();
    }

    #[test]
    fn lazy_connect_defers_dialing() {
        let (port, peer) = raw_peer(|stream| read_exactly(stream, 2));
        let config = ClientConfig {
            lazy_connect: true,
            ..local_config(port)
        };
        let mut client = MllpClient::new(config).unwrap();
        assert!(!client.is_connected());

        // First send dials automatically.
        client.send(b"hi", false).unwrap();
        assert!(client.is_connected());
        assert_eq!(peer.join().unwrap(), b"hi");
    }

    #[test]
    fn disconnect_is_idempotent_from_any_state() {
        let (port, peer) = raw_peer(|_stream| Vec::new());
        let mut client = MllpClient::new(local_config(port)).unwrap();
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
        peer.join().unwrap();

        // Never-connected clients tolerate disconnect too.
        let mut never = MllpClient::new(ClientConfig {
            lazy_connect: true,
            ..ClientConfig::default()
        })
        .unwrap();
        never.disconnect();
    }

    #[test]
    fn send_framed_envelopes_the_payload() {
        let (port, peer) = raw_peer(|stream| read_exactly(stream, 8));
        let mut client = MllpClient::new(local_config(port)).unwrap();
        client.send_framed(b"MSH|x", false).unwrap();

        let mut expected = vec![START_OF_BLOCK];
        expected.extend_from_slice(b"MSH|x");
        expected.push(END_OF_BLOCK);
        expected.push(END_OF_DATA);
        assert_eq!(peer.join().unwrap(), expected);
    }

    #[test]
    fn suppressed_start_marker_yields_malformed_outbound_frame() {
        let (port, peer) = raw_peer(|stream| read_exactly(stream, 7));
        let mut client = MllpClient::new(local_config(port)).unwrap();
        client.set_envelope(Envelope {
            start_of_block: false,
            ..Envelope::FULL
        });
        client.send_framed(b"MSH|x", false).unwrap();

        let seen = peer.join().unwrap();
        assert_eq!(seen[0], b'M', "START_OF_BLOCK must be absent");
        assert_eq!(seen[seen.len() - 2], END_OF_BLOCK);
    }

    #[test]
    fn disconnect_after_send_drops_the_connection() {
        let (port, peer) = raw_peer(|stream| {
            let mut all = Vec::new();
            stream.read_to_end(&mut all).unwrap();
            all
        });
        let mut client = MllpClient::new(local_config(port)).unwrap();
        client.send_framed(b"bye", true).unwrap();
        assert!(!client.is_connected());
        // The peer sees the frame followed by EOF.
        assert_eq!(peer.join().unwrap().len(), 3 + 3);
    }

    #[test]
    fn receive_framed_decodes_a_server_frame() {
        let (port, peer) = raw_peer(|stream| {
            stream.write_all(&[START_OF_BLOCK]).unwrap();
            stream.write_all(b"MSA|AA|1|\r").unwrap();
            stream.write_all(&[END_OF_BLOCK, END_OF_DATA]).unwrap();
            Vec::new()
        });
        let mut client = MllpClient::new(local_config(port)).unwrap();
        let outcome = client.receive_framed().unwrap();
        assert_eq!(outcome.into_message().unwrap().as_ref(), b"MSA|AA|1|\r");
        peer.join().unwrap();
    }

    #[test]
    fn clean_peer_close_reads_as_closed_and_disconnects() {
        let (port, peer) = raw_peer(|_stream| Vec::new());
        let mut client = MllpClient::new(local_config(port)).unwrap();
        peer.join().unwrap();

        let outcome = client.receive_framed().unwrap();
        assert!(outcome.is_closed());
        assert!(!client.is_connected());
    }

    #[test]
    fn receive_without_connection_is_a_not_connected_error() {
        let mut client = MllpClient::new(ClientConfig {
            lazy_connect: true,
            ..ClientConfig::default()
        })
        .unwrap();
        let err = client.receive_framed().unwrap_err();
        assert!(matches!(err, PeerError::NotConnected));
    }

    #[test]
    fn receive_available_collects_unframed_bytes() {
        let (port, peer) = raw_peer(|stream| {
            stream.write_all(b"junk with no envelope").unwrap();
            Vec::new()
        });
        let mut client = MllpClient::new(local_config(port)).unwrap();
        let bytes = client
            .receive_available(Duration::from_millis(500))
            .unwrap();
        assert_eq!(bytes, b"junk with no envelope");
        peer.join().unwrap();
    }

    #[test]
    fn message_counter_tracks_framed_work_and_resets_on_reconnect() {
        let (port, peer) = raw_peer(|stream| {
            let sent = read_exactly(stream, 8);
            stream.write_all(&[START_OF_BLOCK]).unwrap();
            stream.write_all(b"MSA|AA|1|\r").unwrap();
            stream.write_all(&[END_OF_BLOCK, END_OF_DATA]).unwrap();
            sent
        });
        let mut client = MllpClient::new(local_config(port)).unwrap();
        assert_eq!(client.message_count(), 0);

        client.send_framed(b"MSH|x", false).unwrap();
        assert_eq!(client.message_count(), 1);
        client.receive_framed().unwrap();
        assert_eq!(client.message_count(), 2);
        peer.join().unwrap();

        let (port, peer) = raw_peer(|_stream| Vec::new());
        client = MllpClient::new(local_config(port)).unwrap();
        assert_eq!(client.message_count(), 0);
        drop(client);
        peer.join().unwrap();
    }

    #[test]
    fn chunked_send_arrives_whole() {
        let (port, peer) = raw_peer(|stream| read_exactly(stream, 11));
        let mut client = MllpClient::new(local_config(port)).unwrap();
        client
            .send_framed_in_chunks(b"AB\rCD\rEF", b'\r', false)
            .unwrap();

        let mut expected = vec![START_OF_BLOCK];
        expected.extend_from_slice(b"AB\rCD\rEF");
        expected.push(END_OF_BLOCK);
        expected.push(END_OF_DATA);
        assert_eq!(peer.join().unwrap(), expected);
    }
}
