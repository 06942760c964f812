//! Platform socket layer.
//!
//! This module exposes the same set of `sys_*` functions on every target,
//! backed by `libc` on Unix and by WinSock on Windows. Higher layers only
//! deal with [`Socket`], [`RawFd`] and `io::Result`.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

mod socket;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(windows)]
pub(crate) use windows as platform;

pub(crate) use platform::RawFd;
pub(crate) use socket::Socket;

/// Whether a single receive or send may block the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// Honor the descriptor's own blocking mode.
    Block,

    /// Return `WouldBlock` instead of waiting, whatever the descriptor mode.
    DontWait,
}
