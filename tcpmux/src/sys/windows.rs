//! Windows platform layer.
//!
//! Mirrors the Unix layer function for function. WinSock has no
//! per-call "do not wait" flag, so [`Wait::DontWait`] is emulated with a
//! zero-timeout `WSAPoll` on the single descriptor before the call.

use super::Wait;

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4};

use windows_sys::Win32::Networking::WinSock::{
    AF_INET, FIONBIO, INVALID_SOCKET, LINGER, MSG_PEEK, POLLRDNORM, POLLWRNORM, SD_BOTH,
    SD_RECEIVE, SD_SEND, SO_LINGER, SO_REUSEADDR, SOCK_STREAM, SOCKADDR, SOCKADDR_IN, SOCKET,
    SOCKET_ERROR, SOL_SOCKET, WSACleanup, WSADATA, WSAPOLL_EVENT_FLAGS, WSAPOLLFD, WSAPoll,
    WSAStartup, accept, bind, closesocket, connect, getsockname, ioctlsocket, listen, recv, send,
    setsockopt, shutdown, socket,
};

/// Raw socket descriptor type on Windows.
pub(crate) type RawFd = std::os::windows::io::RawSocket;

/// Creates a MAKEWORD value for the WinSock version.
#[inline]
const fn makeword(low: u8, high: u8) -> u16 {
    ((high as u16) << 8) | (low as u16)
}

/// Starts WinSock 2.2.
pub(crate) fn sys_startup() -> io::Result<()> {
    let mut data: WSADATA = unsafe { mem::zeroed() };
    let rc = unsafe { WSAStartup(makeword(2, 2), &mut data) };
    if rc != 0 {
        Err(io::Error::from_raw_os_error(rc))
    } else {
        Ok(())
    }
}

/// Releases one WinSock startup reference.
pub(crate) fn sys_cleanup() {
    unsafe { WSACleanup() };
}

fn check(rc: i32) -> io::Result<()> {
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn setsockopt_value<T>(fd: RawFd, level: i32, name: i32, value: &T) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd as SOCKET,
            level,
            name,
            value as *const T as *const u8,
            mem::size_of::<T>() as i32,
        )
    };
    check(rc)
}

/// Returns `true` when the socket is ready for `events` right now.
fn ready_now(fd: RawFd, events: WSAPOLL_EVENT_FLAGS) -> io::Result<bool> {
    let mut pfd = WSAPOLLFD {
        fd: fd as SOCKET,
        events,
        revents: 0,
    };

    let rc = unsafe { WSAPoll(&mut pfd, 1, 0) };
    if rc == SOCKET_ERROR {
        return Err(io::Error::last_os_error());
    }

    Ok(rc > 0 && pfd.revents != 0)
}

/// Creates an IPv4 stream socket in blocking mode.
pub(crate) fn sys_socket() -> io::Result<RawFd> {
    let fd = unsafe { socket(AF_INET as i32, SOCK_STREAM, 0) };
    if fd == INVALID_SOCKET {
        return Err(io::Error::last_os_error());
    }

    Ok(fd as RawFd)
}

/// Closes a socket descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe {
        let _ = closesocket(fd as SOCKET);
    }
}

/// Switches a socket between blocking and non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let mut mode: u32 = nonblocking as u32;
    let rc = unsafe { ioctlsocket(fd as SOCKET, FIONBIO, &mut mode) };
    if rc != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: i32 = 1;
    setsockopt_value(fd, SOL_SOCKET, SO_REUSEADDR, &yes)
}

/// Sets `SO_LINGER`: `Some(seconds)` makes `closesocket` wait for queued data.
pub(crate) fn sys_set_linger(fd: RawFd, seconds: Option<u16>) -> io::Result<()> {
    let value = LINGER {
        l_onoff: seconds.is_some() as u16,
        l_linger: seconds.unwrap_or(0),
    };
    setsockopt_value(fd, SOL_SOCKET, SO_LINGER, &value)
}

/// Windows never raises a signal on a broken connection.
pub(crate) fn sys_set_nosigpipe(_fd: RawFd) -> io::Result<()> {
    Ok(())
}

/// Binds a socket to an IPv4 address.
pub(crate) fn sys_bind(fd: RawFd, address: &SocketAddrV4) -> io::Result<()> {
    let addr = v4_to_sockaddr(address);
    let rc = unsafe {
        bind(
            fd as SOCKET,
            &addr as *const SOCKADDR_IN as *const SOCKADDR,
            mem::size_of::<SOCKADDR_IN>() as i32,
        )
    };
    check(rc)
}

/// Puts a socket into listening mode.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    check(unsafe { listen(fd as SOCKET, backlog) })
}

/// Accepts one pending connection.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddrV4)> {
    let mut addr: SOCKADDR_IN = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<SOCKADDR_IN>() as i32;

    let client = unsafe {
        accept(
            fd as SOCKET,
            &mut addr as *mut SOCKADDR_IN as *mut SOCKADDR,
            &mut len,
        )
    };
    if client == INVALID_SOCKET {
        return Err(io::Error::last_os_error());
    }

    Ok((client as RawFd, sockaddr_to_v4(&addr)))
}

/// Connects a socket, blocking until the handshake completes.
pub(crate) fn sys_connect(fd: RawFd, address: &SocketAddrV4) -> io::Result<()> {
    let addr = v4_to_sockaddr(address);
    let rc = unsafe {
        connect(
            fd as SOCKET,
            &addr as *const SOCKADDR_IN as *const SOCKADDR,
            mem::size_of::<SOCKADDR_IN>() as i32,
        )
    };
    check(rc)
}

/// Shuts down part or all of a socket connection.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SD_RECEIVE,
        Shutdown::Write => SD_SEND,
        Shutdown::Both => SD_BOTH,
    };

    check(unsafe { shutdown(fd as SOCKET, how) })
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddrV4> {
    let mut addr: SOCKADDR_IN = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<SOCKADDR_IN>() as i32;

    let rc = unsafe {
        getsockname(
            fd as SOCKET,
            &mut addr as *mut SOCKADDR_IN as *mut SOCKADDR,
            &mut len,
        )
    };
    check(rc)?;

    Ok(sockaddr_to_v4(&addr))
}

/// Receives into `buffer`. `Ok(0)` means the peer closed the stream.
pub(crate) fn sys_recv(fd: RawFd, buffer: &mut [u8], wait: Wait) -> io::Result<usize> {
    if wait == Wait::DontWait && !ready_now(fd, POLLRDNORM)? {
        return Err(io::ErrorKind::WouldBlock.into());
    }

    let rc = unsafe { recv(fd as SOCKET, buffer.as_mut_ptr(), buffer.len() as i32, 0) };
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Peeks at most one byte without consuming it and without waiting.
pub(crate) fn sys_peek(fd: RawFd) -> io::Result<usize> {
    if !ready_now(fd, POLLRDNORM)? {
        return Err(io::ErrorKind::WouldBlock.into());
    }

    let mut byte = [0u8; 1];
    let rc = unsafe { recv(fd as SOCKET, byte.as_mut_ptr(), 1, MSG_PEEK) };
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Sends from `buffer`.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8], wait: Wait) -> io::Result<usize> {
    if wait == Wait::DontWait && !ready_now(fd, POLLWRNORM)? {
        return Err(io::ErrorKind::WouldBlock.into());
    }

    let rc = unsafe { send(fd as SOCKET, buffer.as_ptr(), buffer.len() as i32, 0) };
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

fn v4_to_sockaddr(address: &SocketAddrV4) -> SOCKADDR_IN {
    let mut addr: SOCKADDR_IN = unsafe { mem::zeroed() };
    addr.sin_family = AF_INET;
    addr.sin_port = address.port().to_be();
    addr.sin_addr.S_un.S_addr = u32::from(*address.ip()).to_be();
    addr
}

fn sockaddr_to_v4(addr: &SOCKADDR_IN) -> SocketAddrV4 {
    let raw = unsafe { addr.sin_addr.S_un.S_addr };
    SocketAddrV4::new(Ipv4Addr::from(u32::from_be(raw)), u16::from_be(addr.sin_port))
}
