//! Endpoint resolution

use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;
use tracing::{debug, trace};

use crate::common::Endpoint;
use crate::error::{Error, Result};

/// What the resolved endpoint will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Remote peer; port 0 is invalid
    Connect,
    /// Local address; port 0 asks the OS for any free port
    Bind,
}

/// Resolve a host/port pair.
///
/// IP literals are used as-is; names go through the system resolver and
/// the first IPv4 result is preferred.
pub async fn resolve(host: &str, port: u16, purpose: Purpose) -> Result<Endpoint> {
    let fail = |reason: &str| Error::Resolution {
        host: host.to_string(),
        port,
        reason: reason.to_string(),
    };

    if port == 0 && purpose == Purpose::Connect {
        return Err(fail("port 0 is only valid for binding"));
    }
    if host.is_empty() {
        return Err(fail("empty host"));
    }

    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        trace!("Resolved IP literal {}", ip);
        return Ok(Endpoint::new(literal, SocketAddr::new(ip, port)));
    }

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| fail(&e.to_string()))?
        .collect();

    let addr = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| fail("no addresses found"))?;

    debug!("Resolved {}:{} to {}", host, port, addr);
    Ok(Endpoint::new(host, addr))
}
