use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// A connected MLLP transport stream — implements Read + Write.
///
/// Wraps a TCP stream and exposes the socket options an MLLP test peer
/// manipulates: read timeouts, Nagle control, address reuse, and the
/// linger tricks used to force a TCP reset instead of a graceful close.
pub struct MllpStream {
    inner: TcpStream,
}

impl Read for MllpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for MllpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl MllpStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set the read timeout on the underlying socket.
    ///
    /// `None` blocks indefinitely. Bounded reads are the only cancellation
    /// mechanism available to a blocked receive.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Enable or disable Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Enable or disable `SO_REUSEADDR`.
    pub fn set_reuse_address(&self, reuse: bool) -> Result<()> {
        sockopt::set_reuse_address(&self.inner, reuse).map_err(Into::into)
    }

    /// Disable lingering: close() returns immediately, data drains in the
    /// background (the normal graceful-close arrangement).
    pub fn clear_linger(&self) -> Result<()> {
        sockopt::set_linger(&self.inner, None).map_err(Into::into)
    }

    /// Force an abortive close: the next close discards unsent data and
    /// sends a TCP RST instead of a FIN.
    ///
    /// Failures are logged, not raised — reset is always a best-effort
    /// cleanup path.
    pub fn reset(&self) {
        if let Err(err) = sockopt::set_linger(&self.inner, Some(Duration::ZERO)) {
            warn!(%err, "unable to set SO_LINGER to force a reset");
        }
        self.shutdown_both();
    }

    /// Shut down both stream directions, logging (not raising) failures.
    ///
    /// Safe on an already-closed socket; cleanup paths must never raise.
    pub fn shutdown_both(&self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Both) {
            if err.kind() != std::io::ErrorKind::NotConnected {
                warn!(%err, "unable to shut down stream");
            }
        }
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Remote socket address.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Clone this stream (a new handle to the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self { inner: cloned })
    }
}

impl std::fmt::Debug for MllpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MllpStream")
            .field("local", &self.inner.local_addr().ok())
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}

#[cfg(unix)]
pub(crate) mod sockopt {
    use std::os::fd::AsRawFd;
    use std::time::Duration;

    fn setsockopt<T>(fd: libc::c_int, opt: libc::c_int, value: &T) -> std::io::Result<()> {
        // SAFETY: `value` is a valid, live reference for the duration of the
        // call, and `fd` is an open socket descriptor owned by this process.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                (value as *const T).cast::<libc::c_void>(),
                std::mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    pub fn set_linger(sock: &impl AsRawFd, linger: Option<Duration>) -> std::io::Result<()> {
        let arg = libc::linger {
            l_onoff: libc::c_int::from(linger.is_some()),
            l_linger: linger.map_or(0, |d| d.as_secs() as libc::c_int),
        };
        setsockopt(sock.as_raw_fd(), libc::SO_LINGER, &arg)
    }

    pub fn set_reuse_address(sock: &impl AsRawFd, reuse: bool) -> std::io::Result<()> {
        let arg = libc::c_int::from(reuse);
        setsockopt(sock.as_raw_fd(), libc::SO_REUSEADDR, &arg)
    }

    pub fn set_receive_timeout(sock: &impl AsRawFd, timeout: Duration) -> std::io::Result<()> {
        let arg = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        setsockopt(sock.as_raw_fd(), libc::SO_RCVTIMEO, &arg)
    }
}

// SO_LINGER / SO_REUSEADDR / SO_RCVTIMEO-on-accept are not reachable through
// std on this platform; the forced-reset close degrades to a graceful close
// and accept timeouts are not enforced.
#[cfg(not(unix))]
pub(crate) mod sockopt {
    use std::time::Duration;

    pub fn set_linger<T>(_sock: &T, _linger: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }

    pub fn set_reuse_address<T>(_sock: &T, _reuse: bool) -> std::io::Result<()> {
        Ok(())
    }

    pub fn set_receive_timeout<T>(_sock: &T, _timeout: Duration) -> std::io::Result<()> {
        Ok(())
    }
}
