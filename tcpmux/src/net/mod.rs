//! Networking primitives.
//!
//! This module contains the user-facing socket types:
//! - [`Endpoint`], a resolved IPv4 address and port,
//! - [`ListenMultiplexer`], which owns a socket and every connection
//!   accepted or opened through it,
//! - [`StreamConnection`], one TCP stream with timeout-aware reads and
//!   writes.
//!
//! Connections are addressed by [`ConnectionId`] and borrowed from the
//! multiplexer for the duration of a call.

mod buffer;
mod builder;
mod connection;
mod endpoint;
mod multiplexer;
mod reader;
mod ready;

pub use builder::MultiplexerBuilder;
pub use connection::{Origin, StreamConnection};
pub use endpoint::Endpoint;
pub use multiplexer::{ConnectionId, ListenMultiplexer};
