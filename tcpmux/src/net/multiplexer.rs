use super::builder::{ConnectionDefaults, MultiplexerBuilder};
use super::ready::ReadyList;
use super::{Endpoint, Origin, StreamConnection};
use crate::error::{NetError, Result};
use crate::poller::{Event, Interest, Poller, Registration};
use crate::sys::platform::{
    sys_accept, sys_bind, sys_connect, sys_listen, sys_set_nonblocking, sys_set_reuseaddr,
    sys_sockname,
};
use crate::sys::{RawFd, Socket};
use crate::time::{Deadline, Timeout};
use crate::utils::{Key, Slab};

use std::fmt;
use std::io;

use tracing::{debug, trace, warn};

/// Handle to a connection owned by a [`ListenMultiplexer`].
///
/// Ids are never reused: once a connection is reclaimed its id resolves
/// to nothing, even if a later connection takes over the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) Key);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.0.index(), self.0.generation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Bound,
    Listening,
    Connected,
    Closed,
}

/// A socket together with every connection accepted or opened through it.
///
/// In server mode the multiplexer binds, listens and accepts clients
/// while polling. In client mode [`connect`](Self::connect) turns its own
/// socket into a single outgoing connection.
///
/// Readiness is queried with [`poll`](Self::poll), which rebuilds the
/// readable and writable lists from scratch. The lists are walked with
/// [`next_readable`](Self::next_readable) and
/// [`next_writable`](Self::next_writable); closing a connection in the
/// middle of a walk is safe.
///
/// A connection that still holds received bytes is kept until those
/// bytes are read, even after [`close`](Self::close). Reclaim such
/// connections with [`cleanup`](Self::cleanup).
///
/// # Examples
///
/// ```rust,no_run
/// use tcpmux::{ListenMultiplexer, Timeout};
///
/// let mut server = ListenMultiplexer::new(4001)?;
/// server.bind_and_listen(16)?;
///
/// server.poll(true, false, Timeout::Infinite)?;
/// while let Some((id, conn)) = server.next_readable() {
///     if let Ok(Some(line)) = conn.read_until(b"\n", Timeout::Immediate) {
///         println!("{id}: {}", String::from_utf8_lossy(&line));
///     }
/// }
/// # Ok::<(), tcpmux::NetError>(())
/// ```
pub struct ListenMultiplexer {
    /// The multiplexer's own socket; `None` once disconnected.
    socket: Option<Socket>,
    state: State,
    endpoint: Endpoint,

    connections: Slab<StreamConnection>,
    /// Live ids in accept order.
    order: Vec<ConnectionId>,
    /// The outgoing connection sharing the multiplexer's socket.
    alias: Option<ConnectionId>,

    readable: ReadyList,
    writable: ReadyList,

    poller: Poller,
    registrations: Vec<Registration>,
    /// Connection per registration; `None` marks the listening socket.
    tokens: Vec<Option<ConnectionId>>,
    events: Vec<Event>,

    defaults: ConnectionDefaults,
}

impl ListenMultiplexer {
    /// Creates a multiplexer for the wildcard address on `port`, with
    /// default settings.
    pub fn new(port: u16) -> Result<Self> {
        MultiplexerBuilder::new().build(Endpoint::any(port))
    }

    /// Creates a multiplexer for `endpoint`, with default settings.
    ///
    /// Use it to bind a specific local address, or as a client for
    /// [`connect`](Self::connect).
    pub fn with_endpoint(endpoint: Endpoint) -> Result<Self> {
        MultiplexerBuilder::new().build(endpoint)
    }

    /// Returns a builder to configure connection defaults.
    pub fn builder() -> MultiplexerBuilder {
        MultiplexerBuilder::new()
    }

    pub(crate) fn from_builder(
        endpoint: Endpoint,
        defaults: ConnectionDefaults,
        reuse_address: bool,
    ) -> Result<Self> {
        let socket = Socket::stream().map_err(|e| NetError::io("create socket", e))?;

        if reuse_address {
            sys_set_reuseaddr(socket.raw()).map_err(|e| NetError::io("set SO_REUSEADDR", e))?;
        }

        debug!(%endpoint, "multiplexer socket created");

        Ok(Self {
            socket: Some(socket),
            state: State::Created,
            endpoint,
            connections: Slab::new(16),
            order: Vec::new(),
            alias: None,
            readable: ReadyList::default(),
            writable: ReadyList::default(),
            poller: Poller::new(),
            registrations: Vec::new(),
            tokens: Vec::new(),
            events: Vec::new(),
            defaults,
        })
    }

    /// Binds the socket to the configured endpoint.
    pub fn bind(&mut self) -> Result<()> {
        let fd = self.own_fd("bind", &[State::Created])?;

        sys_bind(fd, &self.endpoint.socket_addr()).map_err(|e| NetError::io("bind socket", e))?;
        self.state = State::Bound;

        debug!(endpoint = %self.endpoint, "socket bound");
        Ok(())
    }

    /// Starts listening with room for `backlog` pending clients.
    ///
    /// The listening socket never blocks; accepts are driven by
    /// [`poll`](Self::poll) or [`accept`](Self::accept).
    pub fn listen(&mut self, backlog: i32) -> Result<()> {
        let fd = self.own_fd("listen", &[State::Created, State::Bound])?;

        sys_listen(fd, backlog).map_err(|e| NetError::io("listen on socket", e))?;
        sys_set_nonblocking(fd, true).map_err(|e| NetError::io("set blocking mode", e))?;
        self.state = State::Listening;

        debug!(endpoint = %self.endpoint, backlog, "socket listening");
        Ok(())
    }

    /// [`bind`](Self::bind) followed by [`listen`](Self::listen).
    pub fn bind_and_listen(&mut self, backlog: i32) -> Result<()> {
        self.bind()?;
        self.listen(backlog)
    }

    /// Connects to the configured endpoint.
    ///
    /// The returned connection uses the multiplexer's own socket. Closing
    /// it closes the multiplexer too.
    pub fn connect(&mut self) -> Result<ConnectionId> {
        let fd = self.own_fd("connect", &[State::Created, State::Bound])?;

        sys_connect(fd, &self.endpoint.socket_addr())
            .map_err(|e| NetError::io("connect socket", e))?;
        self.state = State::Connected;

        let conn = StreamConnection::outgoing(fd, self.endpoint, &self.defaults)?;
        let id = self.insert(conn);
        self.alias = Some(id);

        debug!(%id, endpoint = %self.endpoint, "connected");
        Ok(id)
    }

    /// Waits up to `timeout` for one client and accepts it.
    ///
    /// Returns `Ok(None)` if nobody connected in time.
    pub fn accept(&mut self, timeout: Timeout) -> Result<Option<ConnectionId>> {
        let fd = self.own_fd("accept", &[State::Listening])?;
        let deadline = Deadline::start(timeout);

        let registration = [Registration {
            fd,
            interest: Interest {
                read: true,
                write: false,
            },
        }];

        loop {
            let wait = deadline.remaining().map_or(Timeout::Infinite, Timeout::from);
            self.poller
                .poll(&registration, &mut self.events, wait)
                .map_err(|e| NetError::io("wait for connection", e))?;

            if !self.events.is_empty() {
                if let Some(id) = self.accept_ready_listener()? {
                    return Ok(Some(id));
                }
            }

            if deadline.expired() {
                return Ok(None);
            }
        }
    }

    /// Accepts one client from the ready listening socket.
    ///
    /// A client that gave up before it was accepted yields `Ok(None)`.
    fn accept_ready_listener(&mut self) -> Result<Option<ConnectionId>> {
        let Some(fd) = self.socket.as_ref().map(Socket::raw) else {
            return Ok(None);
        };

        let (client, peer) = match sys_accept(fd) {
            Ok(accepted) => accepted,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionAborted
                ) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(NetError::io("accept connection", e)),
        };

        let peer = Endpoint::from(peer);
        let conn = StreamConnection::accepted(Socket::from_raw(client), peer, &self.defaults)?;
        let id = self.insert(conn);

        debug!(%id, %peer, "accepted connection");
        Ok(Some(id))
    }

    /// Waits for readiness and rebuilds the ready lists.
    ///
    /// The listening socket is watched as well; when a client is waiting
    /// it is accepted and shows up in the lists from the next poll on.
    /// Connections holding buffered bytes count as readable without
    /// waiting, after every connection the OS reported.
    ///
    /// Returns the number of ready list entries plus the number of
    /// accepted clients. A timeout with no readiness returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// [`NetError::Io`] if the OS wait fails. Both lists are then empty.
    pub fn poll(&mut self, want_read: bool, want_write: bool, timeout: Timeout) -> Result<usize> {
        self.readable.reset();
        self.writable.reset();
        self.detach_lost_alias();

        self.wait(want_read, want_write, timeout)?;

        let listener_ready = self
            .events
            .iter()
            .any(|e| e.readable && self.tokens[e.token].is_none());

        let mut accepted = 0;
        if listener_ready {
            match self.accept_ready_listener() {
                Ok(Some(_)) => accepted = 1,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "could not accept ready connection"),
            }
        }

        for event in &self.events {
            let Some(id) = self.tokens[event.token] else {
                continue;
            };

            if want_read && event.readable {
                self.readable.push(id);
            }
            if want_write && event.writable {
                self.writable.push(id);
            }
        }

        if want_read {
            for &id in &self.order {
                let buffered = self
                    .connections
                    .get(id.0)
                    .is_some_and(StreamConnection::has_pending_data);

                if buffered && !self.readable.contains(id) {
                    self.readable.push(id);
                }
            }
        }

        let ready = self.readable.len() + self.writable.len() + accepted;
        trace!(
            readable = self.readable.len(),
            writable = self.writable.len(),
            accepted,
            "poll"
        );

        Ok(ready)
    }

    /// Polls for readable connections only.
    pub fn poll_readable(&mut self, timeout: Timeout) -> Result<usize> {
        self.poll(true, false, timeout)
    }

    /// Polls for writable connections only.
    pub fn poll_writable(&mut self, timeout: Timeout) -> Result<usize> {
        self.poll(false, true, timeout)
    }

    /// Counts ready descriptors without accepting anyone and without
    /// touching the ready lists.
    ///
    /// A waiting client on the listening socket counts as one. Buffered
    /// connections count as readable.
    pub fn peek(&mut self, want_read: bool, want_write: bool, timeout: Timeout) -> Result<usize> {
        self.detach_lost_alias();
        self.wait(want_read, want_write, timeout)?;

        let mut ready = self.events.len();
        if want_read {
            ready += self
                .order
                .iter()
                .filter(|&&id| {
                    let signaled = self
                        .events
                        .iter()
                        .any(|e| e.readable && self.tokens[e.token] == Some(id));

                    !signaled
                        && self
                            .connections
                            .get(id.0)
                            .is_some_and(StreamConnection::has_pending_data)
                })
                .count();
        }

        Ok(ready)
    }

    /// Runs one OS wait over the listening socket and every valid connection.
    fn wait(&mut self, want_read: bool, want_write: bool, timeout: Timeout) -> Result<()> {
        self.registrations.clear();
        self.tokens.clear();
        self.events.clear();

        if self.state == State::Listening {
            if let Some(socket) = &self.socket {
                self.registrations.push(Registration {
                    fd: socket.raw(),
                    interest: Interest {
                        read: true,
                        write: false,
                    },
                });
                self.tokens.push(None);
            }
        }

        if want_read || want_write {
            let interest = Interest {
                read: want_read,
                write: want_write,
            };

            for &id in &self.order {
                if let Some(fd) = self.connections.get(id.0).and_then(StreamConnection::raw_fd) {
                    self.registrations.push(Registration { fd, interest });
                    self.tokens.push(Some(id));
                }
            }
        }

        if self.registrations.is_empty() {
            return Ok(());
        }

        // Buffered bytes must not wait behind an idle socket.
        let buffered = want_read
            && self.order.iter().any(|id| {
                self.connections
                    .get(id.0)
                    .is_some_and(StreamConnection::has_pending_data)
            });
        let timeout = if buffered { Timeout::Immediate } else { timeout };

        if let Err(e) = self
            .poller
            .poll(&self.registrations, &mut self.events, timeout)
        {
            self.events.clear();
            return Err(NetError::io("poll descriptors", e));
        }

        Ok(())
    }

    /// Returns the next readable connection from the latest poll.
    ///
    /// Connections that became invalid since the poll are skipped unless
    /// they still hold buffered bytes. Once the list is exhausted this
    /// keeps returning `None` until the next poll.
    pub fn next_readable(&mut self) -> Option<(ConnectionId, &mut StreamConnection)> {
        let connections = &self.connections;
        let id = next_matching(&mut self.readable, |id| {
            connections
                .get(id.0)
                .is_some_and(|c| c.is_valid() || c.has_pending_data())
        })?;

        self.connections.get_mut(id.0).map(|conn| (id, conn))
    }

    /// Returns the next writable connection from the latest poll.
    ///
    /// Connections that became invalid since the poll are skipped.
    pub fn next_writable(&mut self) -> Option<(ConnectionId, &mut StreamConnection)> {
        let connections = &self.connections;
        let id = next_matching(&mut self.writable, |id| {
            connections.get(id.0).is_some_and(StreamConnection::is_valid)
        })?;

        self.connections.get_mut(id.0).map(|conn| (id, conn))
    }

    /// Closes a connection and drops it from both ready lists.
    ///
    /// An accepted connection is shut down and its socket closed. An
    /// outgoing connection is only invalidated, and the multiplexer lets
    /// go of the socket they share. A connection that still holds
    /// buffered bytes stays owned until [`cleanup`](Self::cleanup) finds
    /// it drained. After a peer close in the middle of a message, drain
    /// the tail with [`StreamConnection::read`] first, since no delimited
    /// read will ever consume it.
    ///
    /// Closing an unknown or already closed id does nothing.
    pub fn close(&mut self, id: ConnectionId) {
        self.readable.remove(id);
        self.writable.remove(id);

        let Some(conn) = self.connections.get_mut(id.0) else {
            return;
        };

        match conn.origin() {
            Origin::Accepted => {
                if conn.is_valid() {
                    if let Err(e) = conn.shutdown() {
                        trace!(%id, error = %e, "shutdown before close failed");
                    }
                }
            }
            Origin::Outgoing => conn.invalidate(),
        }

        if conn.has_pending_data() {
            debug!(%id, pending = conn.pending_len(), "close deferred until data is read");
        } else {
            self.reclaim(id);
            debug!(%id, "connection closed");
        }

        self.detach_lost_alias();
    }

    /// Closes every owned connection.
    pub fn close_all(&mut self) {
        for id in self.order.clone() {
            self.close(id);
        }
    }

    /// Frees every connection that is invalid and holds no buffered bytes.
    ///
    /// Returns how many connections were freed.
    pub fn cleanup(&mut self) -> usize {
        let connections = &mut self.connections;
        let readable = &mut self.readable;
        let writable = &mut self.writable;
        let mut reclaimed = 0;

        self.order.retain(|&id| {
            let dead = connections
                .get(id.0)
                .is_none_or(|c| !c.is_valid() && !c.has_pending_data());

            if dead {
                connections.remove(id.0);
                readable.remove(id);
                writable.remove(id);
                reclaimed += 1;
            }
            !dead
        });

        if reclaimed > 0 {
            debug!(reclaimed, remaining = self.order.len(), "cleaned up connections");
        }

        self.detach_lost_alias();
        reclaimed
    }

    /// Closes every connection, then the multiplexer's own socket.
    ///
    /// Buffered bytes of closed connections stay readable.
    pub fn disconnect(&mut self) {
        self.close_all();
        self.readable.reset();
        self.writable.reset();
        self.alias = None;

        if self.socket.take().is_some() {
            debug!(endpoint = %self.endpoint, "multiplexer disconnected");
        }
        self.state = State::Closed;
    }

    fn insert(&mut self, conn: StreamConnection) -> ConnectionId {
        let id = ConnectionId(self.connections.insert(conn));
        self.order.push(id);
        id
    }

    fn reclaim(&mut self, id: ConnectionId) {
        self.connections.remove(id.0);
        self.order.retain(|&owned| owned != id);
    }

    /// Lets go of the socket once the outgoing connection sharing it is gone.
    fn detach_lost_alias(&mut self) {
        let Some(alias) = self.alias else {
            return;
        };

        let lost = self.connections.get(alias.0).is_none_or(|c| !c.is_valid());
        if lost {
            self.alias = None;
            self.socket = None;
            self.state = State::Closed;
            debug!(endpoint = %self.endpoint, "outgoing connection lost, socket released");
        }
    }

    fn own_fd(&mut self, operation: &'static str, allowed: &[State]) -> Result<RawFd> {
        self.detach_lost_alias();

        match &self.socket {
            Some(socket) if allowed.contains(&self.state) => Ok(socket.raw()),
            _ => Err(NetError::InvalidSocket { operation }),
        }
    }

    /// Returns the address the socket is bound to.
    ///
    /// After binding to port 0 this reports the port the OS picked.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        let socket = self.socket.as_ref().ok_or(NetError::InvalidSocket {
            operation: "report local address",
        })?;

        sys_sockname(socket.raw())
            .map(Endpoint::from)
            .map_err(|e| NetError::io("read local address", e))
    }

    /// Returns the endpoint the multiplexer was created for.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Returns `true` while the multiplexer's own socket is usable.
    pub fn is_valid(&self) -> bool {
        let alias_lost = self
            .alias
            .is_some_and(|id| self.connections.get(id.0).is_none_or(|c| !c.is_valid()));

        self.socket.is_some() && !alias_lost
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&StreamConnection> {
        self.connections.get(id.0)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut StreamConnection> {
        self.connections.get_mut(id.0)
    }

    /// Iterates over owned connections in accept order.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &StreamConnection)> {
        self.order
            .iter()
            .filter_map(|&id| self.connections.get(id.0).map(|conn| (id, conn)))
    }

    /// Number of owned connections, including closed ones awaiting cleanup.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Advances `list` to the next id accepted by `keep`.
fn next_matching(
    list: &mut ReadyList,
    keep: impl Fn(ConnectionId) -> bool,
) -> Option<ConnectionId> {
    while let Some(id) = list.advance() {
        if keep(id) {
            return Some(id);
        }
    }
    None
}

impl fmt::Debug for ListenMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenMultiplexer")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl Drop for ListenMultiplexer {
    fn drop(&mut self) {
        self.disconnect();
    }
}
