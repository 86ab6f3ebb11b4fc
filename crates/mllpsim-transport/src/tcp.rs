use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::{sockopt, MllpStream};

/// Resolve `host:port` to the first matching socket address.
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let unresolvable = || TransportError::AddressResolution {
        host: host.to_string(),
        port,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|_| unresolvable())?
        .next()
        .ok_or_else(unresolvable)
}

/// Connect to a listening MLLP peer (blocking, bounded by `timeout`).
pub fn connect_stream(host: &str, port: u16, timeout: Duration) -> Result<MllpStream> {
    let addr = resolve(host, port)?;
    let stream =
        TcpStream::connect_timeout(&addr, timeout).map_err(|source| TransportError::Connect {
            host: host.to_string(),
            port,
            source,
        })?;
    debug!(host, port, "connected");
    Ok(MllpStream::from_tcp(stream))
}

/// A bound TCP listener with a bounded accept wait.
pub struct MllpListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl MllpListener {
    /// Bind and listen on `host:port` (port 0 requests an ephemeral port).
    ///
    /// `accept_timeout` bounds each [`accept`](Self::accept) call; `None`
    /// blocks indefinitely.
    pub fn bind(
        host: &str,
        port: u16,
        backlog: u32,
        accept_timeout: Option<Duration>,
    ) -> Result<Self> {
        let wrap = |source| TransportError::Bind {
            host: host.to_string(),
            port,
            source,
        };

        let addr = resolve(host, port)?;
        let inner = TcpListener::bind(addr).map_err(wrap)?;
        // std always listens with its own backlog; re-listening on the bound
        // socket applies the configured one.
        set_backlog(&inner, backlog).map_err(wrap)?;
        if let Some(timeout) = accept_timeout {
            sockopt::set_receive_timeout(&inner, timeout).map_err(wrap)?;
        }

        let local_addr = inner.local_addr()?;
        info!(%local_addr, "listening");
        Ok(Self { inner, local_addr })
    }

    /// Wait for the next inbound connection.
    ///
    /// Returns `Ok(None)` when the accept timeout expires with no connection
    /// pending — the caller decides whether that is a loop-again or an error.
    pub fn accept(&self) -> Result<Option<MllpStream>> {
        match self.inner.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                Ok(Some(MllpStream::from_tcp(stream)))
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// The effective local address (resolves an ephemeral port request).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The effective listen port.
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl std::fmt::Debug for MllpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MllpListener")
            .field("local", &self.local_addr)
            .finish()
    }
}

#[cfg(unix)]
fn set_backlog(listener: &TcpListener, backlog: u32) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor is owned by `listener` and stays open for the
    // duration of the call.
    let rc = unsafe { libc::listen(listener.as_raw_fd(), backlog as libc::c_int) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn set_backlog(_listener: &TcpListener, _backlog: u32) -> std::io::Result<()> {
    Ok(())
}
