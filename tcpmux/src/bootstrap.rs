//! Process-wide socket subsystem setup.
//!
//! WinSock must be started before any socket call and released when the
//! process is done with networking. On Unix both steps are no-ops, but
//! portable programs still pair them, usually through [`NetworkGuard`].

use crate::error::{NetError, Result};
use crate::sys::platform::{sys_cleanup, sys_startup};

use std::io;
use std::sync::{Mutex, OnceLock};

use tracing::debug;

/// Number of outstanding [`initialize`] calls.
static USERS: Mutex<usize> = Mutex::new(0);

/// Outcome of the implicit startup done by the first socket creation.
static IMPLICIT: OnceLock<Option<i32>> = OnceLock::new();

/// Initializes the socket subsystem.
///
/// Calls are reference-counted; each one must be balanced by
/// [`uninitialize`].
pub fn initialize() -> Result<()> {
    let mut users = USERS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    sys_startup().map_err(|e| NetError::io("initialize socket subsystem", e))?;
    *users += 1;

    debug!(users = *users, "socket subsystem initialized");
    Ok(())
}

/// Releases one [`initialize`] reference.
///
/// Unbalanced calls are ignored.
pub fn uninitialize() {
    let mut users = USERS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if *users == 0 {
        return;
    }

    *users -= 1;
    sys_cleanup();

    debug!(users = *users, "socket subsystem released");
}

/// Makes sure the subsystem is started before the first socket is created.
///
/// This reference lives for the rest of the process.
pub(crate) fn ensure_initialized() -> io::Result<()> {
    let failure = IMPLICIT.get_or_init(|| {
        sys_startup()
            .err()
            .map(|e| e.raw_os_error().unwrap_or_default())
    });

    match failure {
        None => Ok(()),
        Some(code) => Err(io::Error::from_raw_os_error(*code)),
    }
}

/// Keeps the socket subsystem initialized for its lifetime.
///
/// # Examples
///
/// ```
/// let guard = tcpmux::NetworkGuard::new().unwrap();
/// // ... use sockets ...
/// drop(guard);
/// ```
#[derive(Debug)]
pub struct NetworkGuard {
    _private: (),
}

impl NetworkGuard {
    /// Calls [`initialize`] and returns a guard that calls [`uninitialize`] on drop.
    pub fn new() -> Result<Self> {
        initialize()?;
        Ok(Self { _private: () })
    }
}

impl Drop for NetworkGuard {
    fn drop(&mut self) {
        uninitialize();
    }
}
