//! Platform-specific readiness polling.
//!
//! This module provides a unified interface over platform-specific
//! descriptor readiness primitives. The multiplexer hands the poller a
//! list of [`Registration`]s and gets back one [`Event`] per descriptor
//! that is ready, in registration order.
//!
//! The concrete implementation is selected at compile time:
//! - `select(2)` descriptor sets on Unix,
//! - `WSAPoll` on Windows.

use crate::sys::RawFd;

#[cfg(unix)]
mod select;

#[cfg(unix)]
pub(crate) type Poller = select::SelectPoller;

#[cfg(windows)]
mod wsapoll;

#[cfg(windows)]
pub(crate) type Poller = wsapoll::WsaPoller;

/// Directions a descriptor is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

/// A descriptor submitted to one poll call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Registration {
    pub(crate) fd: RawFd,
    pub(crate) interest: Interest,
}

/// Readiness reported by the poller.
///
/// An `Event` is only produced for descriptors that are ready in at least
/// one of the directions they were registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    /// Position of the descriptor in the registration list.
    pub(crate) token: usize,

    /// Indicates that the descriptor is readable (or hung up).
    pub(crate) readable: bool,

    /// Indicates that the descriptor is writable.
    pub(crate) writable: bool,
}
