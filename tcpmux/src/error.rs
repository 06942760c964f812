//! Error type shared by every fallible socket operation.

use std::io;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NetError>;

/// Failure reported by an endpoint, connection or multiplexer operation.
///
/// "Would block" conditions never surface here: they drive the timeout
/// handling of the call that hit them.
#[derive(Debug, Error)]
pub enum NetError {
    /// The connection descriptor was already invalid when the call was made.
    #[error("connection is no longer valid")]
    InvalidConnection,

    /// The multiplexer's own descriptor cannot serve `operation` right now.
    #[error("socket cannot {operation}: descriptor is closed or in the wrong state")]
    InvalidSocket {
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// The peer closed the stream and there was nothing left to hand back.
    #[error("connection was closed by peer")]
    PeerClosed,

    /// A send, receive, poll or setup primitive failed.
    #[error("could not {operation}: {source}")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A host name did not resolve to any IPv4 address.
    #[error("could not find host \"{host}\"")]
    Resolution {
        /// Name that was looked up.
        host: String,
        /// Lookup error, when the resolver reported one.
        #[source]
        source: Option<io::Error>,
    },
}

impl NetError {
    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        NetError::Io { operation, source }
    }

    /// Returns the OS error code carried by this error, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            NetError::Io { source, .. } => source.raw_os_error(),
            NetError::Resolution {
                source: Some(source),
                ..
            } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns `true` for a graceful close by the remote side.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, NetError::PeerClosed)
    }
}
