use super::RawFd;
use super::platform::{sys_close, sys_socket};

use std::io;

/// Owner of exactly one OS socket.
///
/// The descriptor is closed when the `Socket` is dropped. Code that only
/// needs to talk through the descriptor borrows it with [`Socket::raw`].
#[derive(Debug)]
pub(crate) struct Socket {
    fd: RawFd,
}

impl Socket {
    /// Creates a new IPv4 stream socket.
    pub(crate) fn stream() -> io::Result<Self> {
        crate::bootstrap::ensure_initialized()?;

        let fd = sys_socket()?;
        Ok(Self { fd })
    }

    /// Takes ownership of a descriptor returned by the OS, e.g. by `accept`.
    pub(crate) fn from_raw(fd: RawFd) -> Self {
        Self { fd }
    }

    pub(crate) fn raw(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
