use super::buffer::DEFAULT_CAPACITY;
use super::{Endpoint, ListenMultiplexer};
use crate::error::Result;

use std::time::Duration;

/// Sleep between attempts when a read or write would block under an
/// unbounded or timed wait.
pub(crate) const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Settings applied to every connection a multiplexer creates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionDefaults {
    pub(crate) blocking: bool,
    pub(crate) linger: bool,
    pub(crate) buffer_capacity: usize,
    pub(crate) retry_interval: Duration,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            blocking: false,
            linger: false,
            buffer_capacity: DEFAULT_CAPACITY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Builder for configuring and creating a [`ListenMultiplexer`].
///
/// `MultiplexerBuilder` controls the defaults handed to each accepted or
/// outgoing connection, and how the multiplexer's own socket is set up.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tcpmux::{Endpoint, MultiplexerBuilder};
///
/// let server = MultiplexerBuilder::new()
///     .blocking(false)
///     .buffer_capacity(4096)
///     .retry_interval(Duration::from_millis(5))
///     .build(Endpoint::any(4001))?;
/// # Ok::<(), tcpmux::NetError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MultiplexerBuilder {
    defaults: ConnectionDefaults,

    /// Whether `SO_REUSEADDR` is set on the multiplexer's own socket.
    reuse_address: bool,
}

impl MultiplexerBuilder {
    /// Creates a new `MultiplexerBuilder` with default configuration.
    ///
    /// By default connections are non-blocking, do not linger, start
    /// with a 512-byte receive buffer and retry every 10 milliseconds.
    /// The multiplexer's own socket reuses its address.
    pub fn new() -> Self {
        Self {
            defaults: ConnectionDefaults::default(),
            reuse_address: true,
        }
    }

    /// Sets the blocking mode of new connections.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.defaults.blocking = blocking;
        self
    }

    /// Sets the linger policy of new connections.
    pub fn linger(mut self, linger: bool) -> Self {
        self.defaults.linger = linger;
        self
    }

    /// Sets the initial receive buffer capacity of new connections.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer_capacity must be > 0");

        self.defaults.buffer_capacity = capacity;
        self
    }

    /// Sets the sleep between attempts of a read or write that would block.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.defaults.retry_interval = interval;
        self
    }

    /// Sets whether the multiplexer's own socket enables `SO_REUSEADDR`.
    pub fn reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    /// Creates the multiplexer's socket for `endpoint`.
    ///
    /// Nothing is bound or connected yet.
    pub fn build(self, endpoint: Endpoint) -> Result<ListenMultiplexer> {
        ListenMultiplexer::from_builder(endpoint, self.defaults, self.reuse_address)
    }
}

impl Default for MultiplexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let builder = MultiplexerBuilder::new();

        assert!(!builder.defaults.blocking);
        assert!(!builder.defaults.linger);
        assert_eq!(builder.defaults.buffer_capacity, 512);
        assert_eq!(builder.defaults.retry_interval, Duration::from_millis(10));
        assert!(builder.reuse_address);
    }

    #[test]
    #[should_panic(expected = "buffer_capacity must be > 0")]
    fn zero_capacity_is_rejected() {
        let _ = MultiplexerBuilder::new().buffer_capacity(0);
    }
}
