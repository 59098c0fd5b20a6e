//! Endpoint type for network connections

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// A resolved network endpoint.
///
/// Keeps the host as the caller spelled it next to the address it resolved
/// to, so `host()` on a connection to `localhost` still reports `localhost`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    addr: SocketAddr,
}

impl Endpoint {
    /// Create from a host name and the address it resolved to
    pub fn new(host: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            host: host.into(),
            addr,
        }
    }

    /// Create an unspecified endpoint (0.0.0.0:0)
    pub fn unspecified() -> Self {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into()
    }

    /// Get the host part as given
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get the resolved socket address
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Check if this is the IPv4 limited broadcast address
    pub fn is_broadcast(&self) -> bool {
        match self.addr.ip() {
            IpAddr::V4(ip) => ip.is_broadcast(),
            IpAddr::V6(_) => false,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port())
        } else {
            write!(f, "{}:{}", self.host, self.port())
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint {
            host: addr.ip().to_string(),
            addr,
        }
    }
}
