use super::Wait;

use libc::{
    AF_INET, F_GETFL, F_SETFL, MSG_DONTWAIT, MSG_PEEK, O_NONBLOCK, SHUT_RD, SHUT_RDWR, SHUT_WR,
    SO_LINGER, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, accept, bind, c_int, c_void, close, connect,
    fcntl, getsockname, linger, listen, recv, send, setsockopt, shutdown, sockaddr, sockaddr_in,
    socket, socklen_t,
};
use std::io;
use std::mem;
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4};

/// Raw socket descriptor type on Unix.
pub(crate) type RawFd = std::os::fd::RawFd;

/// Flags added to every `send(2)` so a reset peer cannot raise `SIGPIPE`.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
const SEND_FLAGS: c_int = 0;

/// One-time socket subsystem setup. Nothing to do on Unix.
pub(crate) fn sys_startup() -> io::Result<()> {
    Ok(())
}

/// Socket subsystem teardown. Nothing to do on Unix.
pub(crate) fn sys_cleanup() {}

fn check(rc: c_int) -> io::Result<()> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn setsockopt_value<T>(fd: RawFd, level: c_int, name: c_int, value: &T) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            value as *const T as *const c_void,
            mem::size_of::<T>() as socklen_t,
        )
    };
    check(rc)
}

/// Creates an IPv4 stream socket in blocking mode.
pub(crate) fn sys_socket() -> io::Result<RawFd> {
    let fd = unsafe { socket(AF_INET, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

/// Closes a socket descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Switches a descriptor between blocking and non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = if nonblocking {
        flags | O_NONBLOCK
    } else {
        flags & !O_NONBLOCK
    };

    check(unsafe { fcntl(fd, F_SETFL, flags) })
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: c_int = 1;
    setsockopt_value(fd, SOL_SOCKET, SO_REUSEADDR, &yes)
}

/// Sets `SO_LINGER`: `Some(seconds)` makes `close` wait for queued data.
pub(crate) fn sys_set_linger(fd: RawFd, seconds: Option<u16>) -> io::Result<()> {
    let value = linger {
        l_onoff: seconds.is_some() as c_int,
        l_linger: seconds.unwrap_or(0) as c_int,
    };
    setsockopt_value(fd, SOL_SOCKET, SO_LINGER, &value)
}

/// Disables `SIGPIPE` for the socket on targets without `MSG_NOSIGNAL`.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub(crate) fn sys_set_nosigpipe(fd: RawFd) -> io::Result<()> {
    let yes: c_int = 1;
    setsockopt_value(fd, SOL_SOCKET, libc::SO_NOSIGPIPE, &yes)
}

/// `send` already carries `MSG_NOSIGNAL` on this target.
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub(crate) fn sys_set_nosigpipe(_fd: RawFd) -> io::Result<()> {
    Ok(())
}

/// Binds a socket to an IPv4 address.
pub(crate) fn sys_bind(fd: RawFd, address: &SocketAddrV4) -> io::Result<()> {
    let addr = v4_to_sockaddr(address);
    let rc = unsafe {
        bind(
            fd,
            &addr as *const sockaddr_in as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    check(rc)
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    check(unsafe { listen(fd, backlog) })
}

/// Accepts one pending connection.
///
/// The client socket keeps the default blocking mode; callers configure it.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddrV4)> {
    let mut addr: sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_in>() as socklen_t;

    let client = unsafe { accept(fd, &mut addr as *mut sockaddr_in as *mut sockaddr, &mut len) };
    if client < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok((client, sockaddr_to_v4(&addr)))
}

/// Connects a socket, blocking until the handshake completes.
pub(crate) fn sys_connect(fd: RawFd, address: &SocketAddrV4) -> io::Result<()> {
    let addr = v4_to_sockaddr(address);
    let rc = unsafe {
        connect(
            fd,
            &addr as *const sockaddr_in as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    check(rc)
}

/// Shuts down the read, write, or both halves of a socket.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    check(unsafe { shutdown(fd, how) })
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddrV4> {
    let mut addr: sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_in>() as socklen_t;

    let rc =
        unsafe { getsockname(fd, &mut addr as *mut sockaddr_in as *mut sockaddr, &mut len) };
    check(rc)?;

    Ok(sockaddr_to_v4(&addr))
}

/// Receives into `buffer`. `Ok(0)` means the peer closed the stream.
pub(crate) fn sys_recv(fd: RawFd, buffer: &mut [u8], wait: Wait) -> io::Result<usize> {
    let flags = match wait {
        Wait::Block => 0,
        Wait::DontWait => MSG_DONTWAIT,
    };

    let rc = unsafe { recv(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len(), flags) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Peeks at most one byte without consuming it and without waiting.
pub(crate) fn sys_peek(fd: RawFd) -> io::Result<usize> {
    let mut byte = [0u8; 1];
    let rc = unsafe {
        recv(
            fd,
            byte.as_mut_ptr() as *mut c_void,
            1,
            MSG_PEEK | MSG_DONTWAIT,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Sends from `buffer`, never raising `SIGPIPE`.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8], wait: Wait) -> io::Result<usize> {
    let flags = match wait {
        Wait::Block => SEND_FLAGS,
        Wait::DontWait => SEND_FLAGS | MSG_DONTWAIT,
    };

    let rc = unsafe { send(fd, buffer.as_ptr() as *const c_void, buffer.len(), flags) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

fn v4_to_sockaddr(address: &SocketAddrV4) -> sockaddr_in {
    let mut addr: sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = AF_INET as _;
    addr.sin_port = address.port().to_be();
    addr.sin_addr.s_addr = u32::from(*address.ip()).to_be();
    addr
}

fn sockaddr_to_v4(addr: &sockaddr_in) -> SocketAddrV4 {
    let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
    SocketAddrV4::new(ip, u16::from_be(addr.sin_port))
}
