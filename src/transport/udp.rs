//! UDP handles
//!
//! UDP is connectionless: a handle is bound once and every send names its
//! destination.

use socket2::{Domain, Protocol as IpProtocol, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::common::Endpoint;
use crate::error::{Error, Result};

use super::handle::{Protocol, RawSocket, Role, Socket};

impl RawSocket {
    /// Bind a UDP socket.
    ///
    /// `SO_BROADCAST` has to be set before binding for broadcast sends to be
    /// accepted by the OS.
    pub fn bind_udp(endpoint: &Endpoint, broadcast: bool) -> Result<RawSocket> {
        let addr = endpoint.socket_addr();
        let bind_err = |source| Error::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        let socket = socket2::Socket::new(Domain::for_address(addr), Type::DGRAM, Some(IpProtocol::UDP))
            .map_err(bind_err)?;
        if broadcast {
            socket.set_broadcast(true).map_err(bind_err)?;
        }
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;
        debug!("Bound udp socket on {} (broadcast: {})", endpoint, broadcast);

        Ok(RawSocket::new(
            Protocol::Udp,
            Role::Client,
            Socket::Datagram(socket),
            None,
            broadcast,
        ))
    }

    /// Send one datagram to `target`
    pub async fn send_to(&self, buf: &[u8], target: &Endpoint) -> Result<usize> {
        let socket = self.socket()?;
        if !self.broadcast() && target.is_broadcast() {
            return Err(Error::BroadcastDenied(target.to_string()));
        }
        let target = target.socket_addr();

        self.guard(async move {
            socket
                .as_datagram()?
                .send_to(buf, target)
                .await
                .map_err(|source| Error::Send { sent: 0, source })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::net::SocketAddr;

    fn loopback() -> Endpoint {
        Endpoint::from("127.0.0.1:0".parse::<SocketAddr>().unwrap())
    }

    #[tokio::test]
    async fn test_datagram_roundtrip() {
        let receiver = RawSocket::bind_udp(&loopback(), false).unwrap();
        let sender = RawSocket::bind_udp(&loopback(), false).unwrap();
        let target = Endpoint::from(receiver.local_addr().unwrap());

        assert_eq!(sender.send_to(b"ping", &target).await.unwrap(), 4);
        let mut buf = BytesMut::new();
        let (data, from) = receiver.recv(&mut buf, 1024).await.unwrap();
        assert_eq!(&data[..], b"ping");
        assert_eq!(from, sender.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_broadcast_denied_without_flag() {
        let sender = RawSocket::bind_udp(&loopback(), false).unwrap();
        let target = Endpoint::from("255.255.255.255:9999".parse::<SocketAddr>().unwrap());

        let err = sender.send_to(b"x", &target).await.unwrap_err();
        assert!(matches!(err, Error::BroadcastDenied(_)));
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_broadcast_flag_is_recorded() {
        let sender = RawSocket::bind_udp(&Endpoint::unspecified(), true).unwrap();
        assert!(sender.broadcast());
        assert_eq!(sender.protocol(), Protocol::Udp);
    }
}
