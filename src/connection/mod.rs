//! Async connection
//!
//! A [`Connection`] owns one raw socket handle. Writes are plain futures;
//! reads are exposed as a [`DataStream`] that pushes payloads or decoded
//! text as they arrive. Reading and writing can run concurrently.

mod stream;

pub use stream::{Data, DataStream};

use std::io;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::Encoding;
use crate::common::Endpoint;
use crate::config::{ReadOptions, SocketConfig};
use crate::error::{Error, Result};
use crate::transport::{Protocol, RawSocket};

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Closed by the owner
    Closed,
    /// Closed after an unrecoverable I/O or decode error
    Failed,
}

/// State shared between a connection and its data streams
pub(crate) struct Shared {
    pub(crate) handle: RawSocket,
    pub(crate) encoding: Encoding,
    pub(crate) buffer_size: usize,
    local: Endpoint,
    /// Set at construction for TCP; for UDP on the first successful `write_to`
    remote: OnceLock<Endpoint>,
    state: Mutex<ConnectionState>,
}

impl Shared {
    /// Move to FAILED and release the handle
    pub(crate) fn fail(&self, error: &Error) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Open {
                *state = ConnectionState::Failed;
            }
        }
        warn!("Connection {} failed: {}", self.local, error);
        self.handle.close();
    }
}

/// A TCP connection or UDP endpoint
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub(crate) fn new(handle: RawSocket, config: &SocketConfig, remote: Option<Endpoint>) -> Result<Self> {
        let local = Endpoint::from(handle.local_addr()?);
        let remote = match remote {
            Some(remote) => OnceLock::from(remote),
            None => OnceLock::new(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                handle,
                encoding: config.encoding,
                buffer_size: config.buffer_size,
                local,
                remote,
                state: Mutex::new(ConnectionState::Open),
            }),
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.shared.handle.protocol()
    }

    pub fn encoding(&self) -> Encoding {
        self.shared.encoding
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Write the whole payload.
    ///
    /// Partial OS sends are continued until everything is out. On failure
    /// the error carries how many bytes had already been sent. For UDP the
    /// payload is one datagram to the remote endpoint, which is the target
    /// of the first successful `write_to`.
    pub async fn write(&self, bytes: impl AsRef<[u8]>) -> Result<usize> {
        let bytes = bytes.as_ref();
        match self.protocol() {
            Protocol::Tcp => self.write_stream(bytes).await,
            Protocol::Udp => {
                let remote = self.shared.remote.get().ok_or(Error::NoDestination)?;
                self.shared.handle.send_to(bytes, remote).await
            }
        }
    }

    async fn write_stream(&self, bytes: &[u8]) -> Result<usize> {
        let mut sent = 0;
        while sent < bytes.len() {
            match self.shared.handle.send(&bytes[sent..]).await {
                Ok(0) => {
                    return Err(Error::Send {
                        sent,
                        source: io::Error::from(io::ErrorKind::WriteZero),
                    })
                }
                Ok(n) => sent += n,
                Err(Error::Send { source, .. }) => return Err(Error::Send { sent, source }),
                // Closed mid-write: keep the count of what already went out
                Err(Error::ClosedHandle) if sent > 0 => {
                    return Err(Error::Send {
                        sent,
                        source: io::Error::new(io::ErrorKind::NotConnected, "handle closed during write"),
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sent)
    }

    /// Encode text with the connection's encoding and write it
    pub async fn print(&self, text: &str) -> Result<usize> {
        let bytes = self.shared.encoding.encode(text)?;
        self.write(bytes).await
    }

    /// Send one datagram to `endpoint` (UDP only)
    pub async fn write_to(&self, endpoint: &Endpoint, bytes: impl AsRef<[u8]>) -> Result<usize> {
        if self.protocol() != Protocol::Udp {
            return Err(Error::Unsupported("write_to on a TCP connection".into()));
        }
        let sent = self.shared.handle.send_to(bytes.as_ref(), endpoint).await?;
        if self.shared.remote.set(endpoint.clone()).is_ok() {
            debug!("UDP socket {} now defaults to {}", self.shared.local, endpoint);
        }
        Ok(sent)
    }

    /// Encode text and send it as one datagram to `endpoint` (UDP only)
    pub async fn print_to(&self, endpoint: &Endpoint, text: &str) -> Result<usize> {
        let bytes = self.shared.encoding.encode(text)?;
        self.write_to(endpoint, bytes).await
    }

    /// Stream of received data
    pub fn data(&self, options: ReadOptions) -> DataStream {
        DataStream::new(Arc::clone(&self.shared), options)
    }

    /// Shorthand for a raw byte stream
    pub fn bytes(&self) -> DataStream {
        self.data(ReadOptions::bytes())
    }

    /// Shorthand for a decoded text stream
    pub fn text(&self) -> DataStream {
        self.data(ReadOptions::characters())
    }

    /// Close the connection; safe to call any number of times
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closed;
            }
        }
        if self.shared.handle.close() {
            debug!("Connection {} closed", self.shared.local);
        }
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.shared.local
    }

    /// Remote endpoint; unset for UDP sockets until the first `write_to`
    pub fn remote_endpoint(&self) -> Option<&Endpoint> {
        self.shared.remote.get()
    }

    pub fn local_host(&self) -> &str {
        self.shared.local.host()
    }

    pub fn local_port(&self) -> u16 {
        self.shared.local.port()
    }

    pub fn remote_host(&self) -> Option<&str> {
        self.shared.remote.get().map(Endpoint::host)
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.shared.remote.get().map(Endpoint::port)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("protocol", &self.protocol())
            .field("local", &self.shared.local)
            .field("remote", &self.shared.remote.get())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn loopback() -> Endpoint {
        Endpoint::from("127.0.0.1:0".parse::<SocketAddr>().unwrap())
    }

    async fn tcp_pair() -> (Connection, Connection) {
        let config = SocketConfig::default();
        let listener = RawSocket::bind_listen(&loopback(), 16).await.unwrap();
        let addr = Endpoint::from(listener.local_addr().unwrap());

        let (client, server) = tokio::join!(RawSocket::connect_tcp(&addr, true), listener.accept(true));
        let server = server.unwrap();
        let peer = server.peer_addr().map(Endpoint::from);

        let client = Connection::new(client.unwrap(), &config, Some(addr)).unwrap();
        let server = Connection::new(server, &config, peer).unwrap();
        (client, server)
    }

    async fn read_text(stream: &mut DataStream) -> String {
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            text.push_str(&item.unwrap().into_text().unwrap());
        }
        text
    }

    #[tokio::test]
    async fn test_sequential_writes_arrive_in_order() {
        let (client, server) = tcp_pair().await;
        let mut bytes = server.bytes();

        for chunk in ["one", "two", "three"] {
            assert_eq!(client.write(chunk).await.unwrap(), chunk.len());
        }
        client.close();

        let mut received = Vec::new();
        while let Some(item) = bytes.next().await {
            received.extend_from_slice(item.unwrap().as_bytes());
        }
        assert_eq!(received, b"onetwothree");
    }

    #[tokio::test]
    async fn test_large_write_is_sent_completely() {
        let (client, server) = tcp_pair().await;
        let payload = vec![0x5a; 4 * 1024 * 1024];

        let reader = tokio::spawn(async move {
            let mut bytes = server.data(ReadOptions::bytes().with_buffer(8192));
            let mut total = 0;
            while let Some(item) = bytes.next().await {
                let chunk = item.unwrap();
                assert!(chunk.as_bytes().len() <= 8192);
                total += chunk.as_bytes().len();
            }
            total
        });

        assert_eq!(client.write(&payload).await.unwrap(), payload.len());
        client.close();
        assert_eq!(reader.await.unwrap(), payload.len());
    }

    #[tokio::test]
    async fn test_text_flushes_at_end_of_stream() {
        let (client, server) = tcp_pair().await;
        let mut text = server.text();

        client.print("caf\u{e9}").await.unwrap();
        client.close();

        assert_eq!(read_text(&mut text).await, "caf\u{e9}");
    }

    #[tokio::test]
    async fn test_decode_error_fails_connection() {
        let (client, server) = tcp_pair().await;
        let mut text = server.text();

        client.write(b"ok\n").await.unwrap();
        assert_eq!(text.next().await.unwrap().unwrap(), Data::Text("ok\n".into()));

        client.write(b"\xFF\xFE").await.unwrap();
        let err = text.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 3, .. }));

        assert!(text.next().await.is_none());
        assert_eq!(server.state(), ConnectionState::Failed);
        assert!(matches!(server.write(b"x").await, Err(Error::ClosedHandle)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tcp_pair().await;

        client.close();
        client.close();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(client.write(b"late").await, Err(Error::ClosedHandle)));
    }

    #[tokio::test]
    async fn test_close_completes_active_stream() {
        let (_client, server) = tcp_pair().await;
        let server = Arc::new(server);

        let reader = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.bytes().next().await.map(|item| item.is_ok()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        server.close();

        assert_eq!(reader.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tcp_endpoints() {
        let (client, server) = tcp_pair().await;

        assert_eq!(client.protocol(), Protocol::Tcp);
        assert_eq!(client.remote_port(), Some(server.local_port()));
        assert_eq!(server.remote_port(), Some(client.local_port()));
        assert_eq!(client.local_host(), "127.0.0.1");
        assert_eq!(server.remote_host(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_write_to_requires_udp() {
        let (client, _server) = tcp_pair().await;
        let target = Endpoint::from("127.0.0.1:9".parse::<SocketAddr>().unwrap());
        assert!(matches!(client.write_to(&target, b"x").await, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_udp_write_without_destination() {
        let handle = RawSocket::bind_udp(&loopback(), false).unwrap();
        let udp = Connection::new(handle, &SocketConfig::default(), None).unwrap();

        assert!(udp.remote_endpoint().is_none());
        assert!(matches!(udp.write(b"x").await, Err(Error::NoDestination)));
    }

    #[tokio::test]
    async fn test_udp_write_follows_first_target() {
        let config = SocketConfig::default();
        let first = Connection::new(RawSocket::bind_udp(&loopback(), false).unwrap(), &config, None).unwrap();
        let second = Connection::new(RawSocket::bind_udp(&loopback(), false).unwrap(), &config, None).unwrap();
        let sender = Connection::new(RawSocket::bind_udp(&loopback(), false).unwrap(), &config, None).unwrap();
        let mut first_bytes = first.bytes();
        let mut second_bytes = second.bytes();

        sender.write_to(first.local_endpoint(), b"one").await.unwrap();
        sender.write_to(second.local_endpoint(), b"two").await.unwrap();
        assert_eq!(sender.remote_endpoint(), Some(first.local_endpoint()));

        assert_eq!(sender.write(b"three").await.unwrap(), 5);
        assert_eq!(first_bytes.next().await.unwrap().unwrap().as_bytes(), b"one");
        assert_eq!(first_bytes.next().await.unwrap().unwrap().as_bytes(), b"three");
        assert_eq!(second_bytes.next().await.unwrap().unwrap().as_bytes(), b"two");
    }

    #[tokio::test]
    async fn test_close_during_write_reports_sent() {
        let (client, _server) = tcp_pair().await;
        let client = Arc::new(client);
        // Larger than the loopback socket buffers, with nobody reading
        let payload = vec![0x5a; 64 * 1024 * 1024];

        let closer = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                client.close();
            })
        };

        let err = client.write(&payload).await.unwrap_err();
        closer.await.unwrap();
        match err {
            Error::Send { sent, source } => {
                assert!(sent > 0 && sent < payload.len());
                assert_eq!(source.kind(), io::ErrorKind::NotConnected);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_print_reports_unencodable_text() {
        let (client, _server) = tcp_pair().await;
        let config = SocketConfig::default().with_encoding(Encoding::Ascii);
        let handle = RawSocket::bind_udp(&loopback(), false).unwrap();
        let ascii = Connection::new(handle, &config, None).unwrap();

        assert!(matches!(ascii.print_to(client.local_endpoint(), "\u{e9}").await, Err(Error::Encode { .. })));
    }
}
