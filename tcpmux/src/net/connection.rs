use super::Endpoint;
use super::buffer::ReceiveBuffer;
use super::builder::ConnectionDefaults;
use super::reader::{self, RawStream, Received};
use crate::error::{NetError, Result};
use crate::sys::platform::{
    sys_peek, sys_set_linger, sys_set_nonblocking, sys_set_nosigpipe, sys_shutdown,
};
use crate::sys::{RawFd, Socket};
use crate::time::Timeout;

use std::io;
use std::net::Shutdown;
use std::time::Duration;

use tracing::debug;

/// How long `close` waits for queued data when lingering is enabled.
const LINGER_SECONDS: u16 = 10;

/// Where a connection's descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Accepted from a listening multiplexer. The connection owns its socket.
    Accepted,

    /// Created by [`ListenMultiplexer::connect`](super::ListenMultiplexer::connect).
    /// The descriptor is the multiplexer's own socket and is never closed
    /// through the connection.
    Outgoing,
}

#[derive(Debug)]
enum Descriptor {
    Accepted(Socket),
    Outgoing(RawFd),
    Invalid,
}

impl Descriptor {
    fn raw(&self) -> Option<RawFd> {
        match self {
            Descriptor::Accepted(socket) => Some(socket.raw()),
            Descriptor::Outgoing(fd) => Some(*fd),
            Descriptor::Invalid => None,
        }
    }
}

/// One TCP stream owned by a [`ListenMultiplexer`](super::ListenMultiplexer).
///
/// A connection stays usable for buffered data after its descriptor is
/// gone: when the peer closes while bytes are still pending, reads keep
/// handing them out until the prefix is empty. The multiplexer reclaims
/// the object only after that.
///
/// Reads return `Ok(Some(bytes))` when data or a delimited message is
/// available and `Ok(None)` when nothing is available yet. A peer close
/// with nothing left to return is [`NetError::PeerClosed`].
#[derive(Debug)]
pub struct StreamConnection {
    descriptor: Descriptor,
    origin: Origin,
    peer: Endpoint,
    buffer: ReceiveBuffer,
    retry_interval: Duration,
}

impl StreamConnection {
    pub(crate) fn accepted(
        socket: Socket,
        peer: Endpoint,
        defaults: &ConnectionDefaults,
    ) -> Result<Self> {
        Self::configured(Descriptor::Accepted(socket), Origin::Accepted, peer, defaults)
    }

    pub(crate) fn outgoing(
        fd: RawFd,
        peer: Endpoint,
        defaults: &ConnectionDefaults,
    ) -> Result<Self> {
        Self::configured(Descriptor::Outgoing(fd), Origin::Outgoing, peer, defaults)
    }

    fn configured(
        descriptor: Descriptor,
        origin: Origin,
        peer: Endpoint,
        defaults: &ConnectionDefaults,
    ) -> Result<Self> {
        let conn = Self {
            descriptor,
            origin,
            peer,
            buffer: ReceiveBuffer::new(defaults.buffer_capacity),
            retry_interval: defaults.retry_interval,
        };

        conn.set_blocking(defaults.blocking)?;
        conn.set_linger(defaults.linger)?;

        let fd = conn.fd()?;
        sys_set_nosigpipe(fd).map_err(|e| NetError::io("disable SIGPIPE", e))?;

        Ok(conn)
    }

    fn fd(&self) -> Result<RawFd> {
        self.descriptor.raw().ok_or(NetError::InvalidConnection)
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.descriptor.raw()
    }

    /// Reads whatever is available.
    ///
    /// With [`Timeout::Infinite`] this waits for the first bytes; with
    /// [`Timeout::Immediate`] it makes one attempt. Bytes left over from an
    /// earlier delimited read come first and are enough to return.
    ///
    /// # Errors
    ///
    /// - [`NetError::PeerClosed`] if the peer closed and nothing was received,
    /// - [`NetError::InvalidConnection`] if the connection was already
    ///   invalid and holds no buffered bytes,
    /// - [`NetError::Io`] on a receive failure. Bytes received before the
    ///   failure stay buffered for the next read.
    pub fn read(&mut self, timeout: Timeout) -> Result<Option<Vec<u8>>> {
        self.receive(None, timeout)
    }

    /// Reads up to and including `delimiter`.
    ///
    /// The delimiter is found even when it arrives split across several
    /// receives. Bytes after it are kept for the next read. When the
    /// timeout runs out first, the partial message stays buffered and
    /// `Ok(None)` is returned, so a later call picks up where this one
    /// stopped.
    ///
    /// An empty delimiter behaves like [`read`](Self::read).
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read). A peer close in the middle of a
    /// message reports [`NetError::PeerClosed`]; the partial message can
    /// still be retrieved with [`read`](Self::read).
    pub fn read_until(&mut self, delimiter: &[u8], timeout: Timeout) -> Result<Option<Vec<u8>>> {
        self.receive(Some(delimiter), timeout)
    }

    fn receive(&mut self, delimiter: Option<&[u8]>, timeout: Timeout) -> Result<Option<Vec<u8>>> {
        let Some(fd) = self.descriptor.raw() else {
            return self.drain_buffered(delimiter);
        };

        let outcome = reader::receive(
            &mut RawStream(fd),
            &mut self.buffer,
            delimiter,
            timeout,
            self.retry_interval,
        )
        .map_err(|e| NetError::io("receive from connection", e))?;

        match outcome {
            Received::Matched(bytes) | Received::Data(bytes) => Ok(Some(bytes)),
            Received::Nothing => Ok(None),
            Received::Closed(bytes) => {
                debug!(
                    peer = %self.peer,
                    pending = self.buffer.pending_len(),
                    "peer closed connection"
                );
                self.invalidate();

                if bytes.is_empty() {
                    Err(NetError::PeerClosed)
                } else {
                    Ok(Some(bytes))
                }
            }
        }
    }

    /// Serves a read on a connection whose descriptor is gone.
    fn drain_buffered(&mut self, delimiter: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match delimiter.filter(|d| !d.is_empty()) {
            Some(delim) => match self.buffer.split_pending(delim) {
                Some(message) => Ok(Some(message)),
                None if self.buffer.has_pending() => Err(NetError::PeerClosed),
                None => Err(NetError::InvalidConnection),
            },
            None if self.buffer.has_pending() => Ok(Some(self.buffer.take_pending())),
            None => Err(NetError::InvalidConnection),
        }
    }

    /// Writes all of `bytes`, retrying partial sends within `timeout`.
    ///
    /// Returns the number of bytes written, which is short of
    /// `bytes.len()` when the timeout ran out or the peer went away. A
    /// reset or broken pipe invalidates the connection but is not an
    /// error. The write never raises `SIGPIPE`.
    ///
    /// # Errors
    ///
    /// [`NetError::InvalidConnection`] on an invalid connection, and
    /// [`NetError::Io`] for any other send failure. A failed send also
    /// invalidates the connection.
    pub fn write(&mut self, bytes: &[u8], timeout: Timeout) -> Result<usize> {
        let fd = self.fd()?;

        match reader::transmit(&mut RawStream(fd), bytes, timeout, self.retry_interval) {
            Ok(sent) => {
                if sent.peer_closed {
                    debug!(
                        peer = %self.peer,
                        written = sent.written,
                        "peer reset connection during write"
                    );
                    self.invalidate();
                }
                Ok(sent.written)
            }
            Err(e) => {
                self.invalidate();
                Err(NetError::io("send on connection", e))
            }
        }
    }

    /// Switches the descriptor between blocking and non-blocking mode.
    pub fn set_blocking(&self, blocking: bool) -> Result<()> {
        let fd = self.fd()?;
        sys_set_nonblocking(fd, !blocking).map_err(|e| NetError::io("set blocking mode", e))
    }

    /// Enables or disables lingering on close.
    pub fn set_linger(&self, linger: bool) -> Result<()> {
        let fd = self.fd()?;
        let seconds = linger.then_some(LINGER_SECONDS);
        sys_set_linger(fd, seconds).map_err(|e| NetError::io("set linger policy", e))
    }

    /// Checks whether the peer is still connected without consuming data.
    ///
    /// Returns `false` for an invalid connection, a closed stream or a
    /// failed peek. Never waits.
    pub fn is_alive(&self) -> bool {
        let Some(fd) = self.descriptor.raw() else {
            return false;
        };

        match sys_peek(fd) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
        }
    }

    /// Stops receiving. The connection stays valid for writing.
    pub fn shutdown_read(&mut self) -> Result<()> {
        let fd = self.fd()?;
        sys_shutdown(fd, Shutdown::Read).map_err(|e| NetError::io("shut down reading", e))
    }

    /// Stops sending. The peer sees end of stream.
    pub fn shutdown_write(&mut self) -> Result<()> {
        let fd = self.fd()?;
        sys_shutdown(fd, Shutdown::Write).map_err(|e| NetError::io("shut down writing", e))
    }

    /// Shuts down both directions and invalidates the connection.
    ///
    /// Buffered bytes remain readable.
    pub fn shutdown(&mut self) -> Result<()> {
        let fd = self.fd()?;
        let result =
            sys_shutdown(fd, Shutdown::Both).map_err(|e| NetError::io("shut down connection", e));

        self.invalidate();
        result
    }

    /// Drops the descriptor. Calling it again does nothing.
    ///
    /// An accepted socket is closed. An outgoing connection only forgets
    /// the multiplexer's descriptor.
    pub fn invalidate(&mut self) {
        if matches!(self.descriptor, Descriptor::Invalid) {
            return;
        }

        debug!(peer = %self.peer, origin = ?self.origin, "connection invalidated");
        self.descriptor = Descriptor::Invalid;
    }

    /// Returns `true` while the connection has a descriptor.
    pub fn is_valid(&self) -> bool {
        !matches!(self.descriptor, Descriptor::Invalid)
    }

    /// Returns `true` if received bytes are waiting to be read.
    pub fn has_pending_data(&self) -> bool {
        self.buffer.has_pending()
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.pending_len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Grows the receive buffer to at least `capacity` bytes.
    ///
    /// The buffer never shrinks and buffered bytes are preserved.
    pub fn set_buffer_capacity(&mut self, capacity: usize) {
        self.buffer.reserve(capacity);
    }

    /// Returns the remote endpoint.
    pub fn peer(&self) -> Endpoint {
        self.peer
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::IntoRawFd;

    /// An accepted connection paired with the std client talking to it.
    fn pair(defaults: ConnectionDefaults) -> (StreamConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();

        let peer = match peer {
            std::net::SocketAddr::V4(v4) => Endpoint::from(v4),
            std::net::SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
        };

        let socket = Socket::from_raw(server.into_raw_fd());
        let conn = StreamConnection::accepted(socket, peer, &defaults).unwrap();
        (conn, client)
    }

    #[test]
    fn reads_lines_and_keeps_the_remainder() {
        let (mut conn, mut client) = pair(ConnectionDefaults::default());
        client.write_all(b"one\ntwo").unwrap();

        let line = conn
            .read_until(b"\n", Timeout::After(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(line.as_deref(), Some(&b"one\n"[..]));
        assert_eq!(conn.pending_len(), 3);
    }

    #[test]
    fn peer_close_keeps_partial_message_readable() {
        let (mut conn, mut client) = pair(ConnectionDefaults::default());
        client.write_all(b"unterminated").unwrap();
        drop(client);

        let err = conn.read_until(b"\n", Timeout::Infinite).unwrap_err();
        assert!(err.is_peer_closed());
        assert!(!conn.is_valid());

        assert_eq!(
            conn.read(Timeout::Immediate).unwrap().as_deref(),
            Some(&b"unterminated"[..])
        );
        assert!(matches!(
            conn.read(Timeout::Immediate),
            Err(NetError::InvalidConnection)
        ));
    }

    #[test]
    fn writes_reach_the_peer() {
        let (mut conn, mut client) = pair(ConnectionDefaults::default());

        let written = conn.write(b"pong", Timeout::Infinite).unwrap();
        assert_eq!(written, 4);

        let mut got = [0u8; 4];
        client.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"pong");
    }

    #[test]
    fn invalid_connection_rejects_configuration() {
        let (mut conn, _client) = pair(ConnectionDefaults::default());
        conn.invalidate();
        conn.invalidate();

        assert!(matches!(
            conn.set_blocking(true),
            Err(NetError::InvalidConnection)
        ));
        assert!(matches!(
            conn.set_linger(true),
            Err(NetError::InvalidConnection)
        ));
        assert!(!conn.is_alive());
    }

    #[test]
    fn liveness_follows_the_peer() {
        let (conn, client) = pair(ConnectionDefaults::default());
        assert!(conn.is_alive());

        drop(client);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while conn.is_alive() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!conn.is_alive());
    }

    #[test]
    fn buffer_capacity_only_grows() {
        let defaults = ConnectionDefaults {
            buffer_capacity: 16,
            ..ConnectionDefaults::default()
        };
        let (mut conn, _client) = pair(defaults);

        conn.set_buffer_capacity(8);
        assert_eq!(conn.buffer_capacity(), 16);

        conn.set_buffer_capacity(100);
        assert!(conn.buffer_capacity() >= 100);
    }
}
