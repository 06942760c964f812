//! # tcpmux
//!
//! **tcpmux** is a small, cross-platform TCP sockets layer for the **Nebula** ecosystem.
//!
//! It does not try to be an async runtime. It offers blocking-equivalent, timeout-aware
//! connection objects and a listening-socket multiplexer with a `select`-style readiness
//! model, which is all that line-oriented control channels need:
//!
//! - A **listening multiplexer** ([`ListenMultiplexer`]) that accepts clients on demand,
//!   waits for readiness over every live connection and hands out the readable and
//!   writable ones through cursors that survive connections closing mid-iteration
//! - **Stream connections** ([`StreamConnection`]) with a growable receive buffer,
//!   blocking, non-blocking and timed reads, and writes that retry until done
//! - **Delimiter framing**: `read_until` finds a token even when it is split across
//!   several network reads, and keeps whatever follows it for the next call
//! - **Endpoints** that parse dotted-quad literals or resolve host names
//! - A self-contained **base64** codec
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcpmux::{ListenMultiplexer, Timeout};
//!
//! fn main() -> tcpmux::Result<()> {
//!     let _net = tcpmux::NetworkGuard::new()?;
//!
//!     let mut server = ListenMultiplexer::new(4001)?;
//!     server.bind_and_listen(5)?;
//!
//!     loop {
//!         server.poll_readable(Timeout::Infinite)?;
//!
//!         while let Some((id, conn)) = server.next_readable() {
//!             match conn.read_until(b"\n", Timeout::Immediate) {
//!                 Ok(Some(line)) => {
//!                     conn.write(&line, Timeout::Infinite)?;
//!                 }
//!                 Ok(None) => {}
//!                 Err(_) => {
//!                     // An unterminated tail stays buffered until read.
//!                     let _tail = conn.read(Timeout::Immediate);
//!                     server.close(id);
//!                 }
//!             }
//!         }
//!
//!         server.cleanup();
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`net`]: Endpoints, stream connections and the listening multiplexer
//! - [`codec`]: Base64 encoding and decoding
//! - [`time`]: Timeout encodings shared by reads, writes and polls
//!
//! ## Threading
//!
//! A multiplexer and the connections it owns are not synchronized. Use one multiplexer
//! per thread, or serialize access to it externally.

mod bootstrap;
mod error;
mod poller;
mod sys;
mod utils;

pub mod codec;
pub mod net;
pub mod time;

pub use bootstrap::{NetworkGuard, initialize, uninitialize};
pub use error::{NetError, Result};
pub use net::{
    ConnectionId, Endpoint, ListenMultiplexer, MultiplexerBuilder, Origin, StreamConnection,
};
pub use time::Timeout;
