//! TCP handles: connect, listen, accept, send

use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use crate::common::Endpoint;
use crate::error::{Error, Result};

use super::handle::{Protocol, RawSocket, Role, Socket};

impl RawSocket {
    /// Connect to a remote endpoint
    pub async fn connect_tcp(endpoint: &Endpoint, nodelay: bool) -> Result<RawSocket> {
        let connect_err = |source| Error::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        let stream = TcpStream::connect(endpoint.socket_addr())
            .await
            .map_err(connect_err)?;
        stream.set_nodelay(nodelay).map_err(connect_err)?;

        debug!("Connected to {}", endpoint);
        Ok(RawSocket::new(
            Protocol::Tcp,
            Role::Client,
            Socket::Stream(stream),
            Some(endpoint.socket_addr()),
            false,
        ))
    }

    /// Bind to a local endpoint and start listening
    pub async fn bind_listen(endpoint: &Endpoint, backlog: u32) -> Result<RawSocket> {
        let addr = endpoint.socket_addr();
        let bind_err = |source| Error::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_err)?;

        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(backlog).map_err(bind_err)?;

        debug!("Listening on {} (backlog {})", endpoint, backlog);
        Ok(RawSocket::new(
            Protocol::Tcp,
            Role::Server,
            Socket::Listener(listener),
            None,
            false,
        ))
    }

    /// Wait for the next peer.
    ///
    /// The accepted connection gets its own handle; the listening handle is
    /// never shared with it.
    pub async fn accept(&self, nodelay: bool) -> Result<RawSocket> {
        let socket = self.socket()?;
        let (stream, peer) = self
            .guard(async move {
                let listener = socket.as_listener()?;
                listener.accept().await.map_err(Error::Accept)
            })
            .await?;
        stream.set_nodelay(nodelay).map_err(Error::Accept)?;

        debug!("Accepted connection from {}", peer);
        Ok(RawSocket::new(
            Protocol::Tcp,
            Role::Server,
            Socket::Stream(stream),
            Some(peer),
            false,
        ))
    }

    /// Send once on a connected stream; may accept only part of `buf`
    pub async fn send(&self, buf: &[u8]) -> Result<usize> {
        let socket = self.socket()?;
        self.guard(async move {
            let stream = socket.as_stream()?;
            loop {
                stream
                    .writable()
                    .await
                    .map_err(|source| Error::Send { sent: 0, source })?;
                match stream.try_write(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(source) => return Err(Error::Send { sent: 0, source }),
                }
            }
        })
        .await
    }
}
