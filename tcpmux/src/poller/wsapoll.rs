//! Windows `WSAPoll`-based poller.
//!
//! Mirrors the semantics of the Unix `select(2)` backend: the descriptor
//! array is rebuilt per call and readiness is reported in registration
//! order. Hang-ups and errors count as readable so that the next receive
//! observes them.

use super::{Event, Registration};
use crate::time::Timeout;

use std::io;

use windows_sys::Win32::Networking::WinSock::{
    POLLERR, POLLHUP, POLLRDNORM, POLLWRNORM, SOCKET, SOCKET_ERROR, WSAPOLL_EVENT_FLAGS,
    WSAPOLLFD, WSAPoll,
};

/// Readiness poller over `WSAPoll`.
pub(crate) struct WsaPoller {
    /// Reusable descriptor array.
    fds: Vec<WSAPOLLFD>,
}

impl WsaPoller {
    pub(crate) fn new() -> Self {
        Self { fds: Vec::new() }
    }

    /// Waits until one registered socket is ready or `timeout` elapses.
    pub(crate) fn poll(
        &mut self,
        registrations: &[Registration],
        events: &mut Vec<Event>,
        timeout: Timeout,
    ) -> io::Result<usize> {
        events.clear();
        self.fds.clear();

        // WSAPoll rejects an empty array.
        if registrations.is_empty() {
            return Ok(0);
        }

        for reg in registrations {
            let mut ev: WSAPOLL_EVENT_FLAGS = 0;
            if reg.interest.read {
                ev |= POLLRDNORM;
            }
            if reg.interest.write {
                ev |= POLLWRNORM;
            }

            self.fds.push(WSAPOLLFD {
                fd: reg.fd as SOCKET,
                events: ev,
                revents: 0,
            });
        }

        // Round up so a sub-millisecond wait does not become a busy poll.
        let timeout_ms = timeout
            .limit()
            .map(|d| d.as_micros().div_ceil(1_000).min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let rc = unsafe { WSAPoll(self.fds.as_mut_ptr(), self.fds.len() as u32, timeout_ms) };
        if rc == SOCKET_ERROR {
            return Err(io::Error::last_os_error());
        }

        for (token, (pfd, reg)) in self.fds.iter().zip(registrations).enumerate() {
            let re = pfd.revents;
            if re == 0 {
                continue;
            }

            let readable = reg.interest.read && (re & (POLLRDNORM | POLLERR | POLLHUP)) != 0;
            let writable = reg.interest.write && (re & (POLLWRNORM | POLLERR | POLLHUP)) != 0;

            if readable || writable {
                events.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(rc as usize)
    }
}
