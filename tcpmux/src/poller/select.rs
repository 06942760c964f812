//! `select(2)`-based poller.
//!
//! Descriptor sets are rebuilt on every call, which matches the
//! multiplexer's model of rebuilding its ready lists wholesale per poll.
//! Descriptors at or above `FD_SETSIZE` cannot be represented and are
//! rejected up front.

use super::{Event, Registration};
use crate::time::Timeout;

use libc::{FD_ISSET, FD_SET, FD_SETSIZE, FD_ZERO, fd_set, select, suseconds_t, time_t, timeval};
use std::io;
use std::mem;
use std::ptr;
use std::time::Duration;

/// Readiness poller over `select(2)`.
pub(crate) struct SelectPoller {
    read: fd_set,
    write: fd_set,
}

impl SelectPoller {
    pub(crate) fn new() -> Self {
        Self {
            read: unsafe { mem::zeroed() },
            write: unsafe { mem::zeroed() },
        }
    }

    /// Waits until one registered descriptor is ready or `timeout` elapses.
    ///
    /// Returns the count reported by `select`. A wait interrupted by a
    /// signal reports zero events.
    pub(crate) fn poll(
        &mut self,
        registrations: &[Registration],
        events: &mut Vec<Event>,
        timeout: Timeout,
    ) -> io::Result<usize> {
        events.clear();

        let mut max_fd = -1;
        for reg in registrations {
            if reg.fd < 0 || reg.fd as usize >= FD_SETSIZE as usize {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "descriptor does not fit in an fd_set",
                ));
            }
            max_fd = max_fd.max(reg.fd);
        }

        let mut tv = timeout.limit().map(to_timeval);
        let tv_ptr = tv
            .as_mut()
            .map_or(ptr::null_mut(), |tv| tv as *mut timeval);

        let rc = unsafe {
            FD_ZERO(&mut self.read);
            FD_ZERO(&mut self.write);

            for reg in registrations {
                if reg.interest.read {
                    FD_SET(reg.fd, &mut self.read);
                }
                if reg.interest.write {
                    FD_SET(reg.fd, &mut self.write);
                }
            }

            select(
                max_fd + 1,
                &mut self.read,
                &mut self.write,
                ptr::null_mut(),
                tv_ptr,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        for (token, reg) in registrations.iter().enumerate() {
            let (readable, writable) = unsafe {
                (
                    reg.interest.read && FD_ISSET(reg.fd, &self.read),
                    reg.interest.write && FD_ISSET(reg.fd, &self.write),
                )
            };

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

/// Splits whole seconds from the sub-second remainder, rounding the
/// remainder up to the next microsecond.
fn to_timeval(duration: Duration) -> timeval {
    let mut secs = duration.as_secs();
    let mut micros = duration.subsec_nanos().div_ceil(1_000);

    if micros >= 1_000_000 {
        secs += 1;
        micros -= 1_000_000;
    }

    timeval {
        tv_sec: secs.min(time_t::MAX as u64) as time_t,
        tv_usec: micros as suseconds_t,
    }
}
