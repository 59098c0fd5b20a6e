//! Public entry points
//!
//! [`AsyncSocket`] cannot be instantiated; it only groups the constructors
//! for TCP clients, TCP listeners and UDP endpoints.

use tracing::debug;

use crate::common::Endpoint;
use crate::config::SocketConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::listener::Listener;
use crate::transport::{resolve, Purpose, RawSocket};

/// Factory for connections and listeners
pub enum AsyncSocket {}

impl AsyncSocket {
    /// Connect to a TCP server
    pub async fn connect(host: &str, port: u16) -> Result<Connection> {
        Self::connect_with(host, port, &SocketConfig::default()).await
    }

    pub async fn connect_with(host: &str, port: u16, config: &SocketConfig) -> Result<Connection> {
        config.validate()?;
        let endpoint = resolve(host, port, Purpose::Connect).await?;
        let handle = RawSocket::connect_tcp(&endpoint, config.nodelay).await?;
        Connection::new(handle, config, Some(endpoint))
    }

    /// Listen for TCP connections; binding happens on first poll
    pub fn listen(host: &str, port: u16) -> Listener {
        Self::listen_with(host, port, SocketConfig::default())
    }

    pub fn listen_with(host: &str, port: u16, config: SocketConfig) -> Listener {
        Listener::new(host, port, config)
    }

    /// UDP socket on an ephemeral local port, for sending with `write_to`
    pub async fn udp(broadcast: bool) -> Result<Connection> {
        Self::udp_with(&SocketConfig::default().with_broadcast(broadcast)).await
    }

    pub async fn udp_with(config: &SocketConfig) -> Result<Connection> {
        config.validate()?;
        let handle = RawSocket::bind_udp(&Endpoint::unspecified(), config.broadcast)?;
        let connection = Connection::new(handle, config, None)?;
        debug!("UDP socket ready on {}", connection.local_endpoint());
        Ok(connection)
    }

    /// UDP socket bound to `host:port`; datagrams from every sender arrive
    /// on the same data stream
    pub async fn bind_udp(host: &str, port: u16, broadcast: bool) -> Result<Connection> {
        Self::bind_udp_with(host, port, &SocketConfig::default().with_broadcast(broadcast)).await
    }

    pub async fn bind_udp_with(host: &str, port: u16, config: &SocketConfig) -> Result<Connection> {
        config.validate()?;
        let endpoint = resolve(host, port, Purpose::Bind).await?;
        let handle = RawSocket::bind_udp(&endpoint, config.broadcast)?;
        Connection::new(handle, config, None)
    }
}
