use crate::error::{NetError, Result};

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

/// An IPv4 address and port.
///
/// An `Endpoint` is resolved once, at construction, and is immutable
/// afterwards. Use it as the local address of a listening multiplexer or
/// as the remote address of a client-mode one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddrV4,
}

impl Endpoint {
    /// Creates an endpoint from an address that is already numeric.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            addr: SocketAddrV4::new(ip, port),
        }
    }

    /// The wildcard address (`0.0.0.0`) on `port`.
    pub fn any(port: u16) -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, port)
    }

    /// Resolves `host` and pairs it with `port`.
    ///
    /// A dotted-quad literal such as `"127.0.0.1"` is parsed directly and
    /// never touches the resolver. Anything else goes through a blocking
    /// name lookup, keeping the first IPv4 answer.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Resolution`] if the literal is malformed or the
    /// lookup yields no IPv4 address.
    ///
    /// # Examples
    ///
    /// ```
    /// use tcpmux::Endpoint;
    ///
    /// let endpoint = Endpoint::resolve("192.168.0.10", 4001).unwrap();
    /// assert_eq!(endpoint.address(), "192.168.0.10");
    /// assert_eq!(endpoint.port(), 4001);
    /// ```
    pub fn resolve(host: &str, port: u16) -> Result<Self> {
        if is_dotted_quad(host) {
            return host
                .parse::<Ipv4Addr>()
                .map(|ip| Self::new(ip, port))
                .map_err(|_| NetError::Resolution {
                    host: host.to_owned(),
                    source: None,
                });
        }

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| NetError::Resolution {
                host: host.to_owned(),
                source: Some(e),
            })?;

        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(Self { addr: v4 }),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| NetError::Resolution {
                host: host.to_owned(),
                source: None,
            })
    }

    /// The address as a dotted-quad string.
    pub fn address(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.addr.ip()
    }

    /// The port in host byte order.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        self.addr
    }
}

/// Four dot-separated groups of one to three ASCII digits.
fn is_dotted_quad(text: &str) -> bool {
    let mut groups = 0;

    for part in text.split('.') {
        groups += 1;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }

    groups == 4
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self { addr }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        SocketAddr::V4(endpoint.addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_dotted_quads() {
        assert!(is_dotted_quad("127.0.0.1"));
        assert!(is_dotted_quad("999.1.1.1"));
        assert!(!is_dotted_quad("127.0.0"));
        assert!(!is_dotted_quad("127.0.0.1.5"));
        assert!(!is_dotted_quad("localhost"));
        assert!(!is_dotted_quad("1..2.3"));
    }

    #[test]
    fn malformed_literal_is_a_resolution_error() {
        let err = Endpoint::resolve("999.1.1.1", 80).unwrap_err();
        assert!(matches!(err, NetError::Resolution { ref host, .. } if host == "999.1.1.1"));
    }
}
