//! Raw socket handle
//!
//! Owns one OS socket. Closing takes the socket out of the handle, so the
//! descriptor is released once, and wakes every in-flight operation so it
//! fails with `ClosedHandle` instead of completing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Error, Result};

/// Transport protocol of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Which side created the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The OS socket behind a handle
pub(crate) enum Socket {
    Stream(TcpStream),
    Listener(TcpListener),
    Datagram(UdpSocket),
}

impl Socket {
    pub(crate) fn as_stream(&self) -> Result<&TcpStream> {
        match self {
            Socket::Stream(stream) => Ok(stream),
            _ => Err(Error::Unsupported("not a connected TCP socket".into())),
        }
    }

    pub(crate) fn as_listener(&self) -> Result<&TcpListener> {
        match self {
            Socket::Listener(listener) => Ok(listener),
            _ => Err(Error::Unsupported("not a listening socket".into())),
        }
    }

    pub(crate) fn as_datagram(&self) -> Result<&UdpSocket> {
        match self {
            Socket::Datagram(socket) => Ok(socket),
            _ => Err(Error::Unsupported("not a UDP socket".into())),
        }
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Socket::Stream(s) => s.local_addr(),
            Socket::Listener(l) => l.local_addr(),
            Socket::Datagram(d) => d.local_addr(),
        }
    }
}

/// Close coordination shared by every operation on a handle
struct HandleState {
    closed: AtomicBool,
    notify: Notify,
}

impl HandleState {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the handle is closed
    async fn closed(&self) {
        loop {
            // Register before checking the flag so a concurrent close is not missed
            let notified = self.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// Exclusively owned OS socket
pub struct RawSocket {
    protocol: Protocol,
    role: Role,
    broadcast: bool,
    peer: Option<SocketAddr>,
    socket: Mutex<Option<Arc<Socket>>>,
    state: HandleState,
}

impl RawSocket {
    pub(crate) fn new(
        protocol: Protocol,
        role: Role,
        socket: Socket,
        peer: Option<SocketAddr>,
        broadcast: bool,
    ) -> Self {
        Self {
            protocol,
            role,
            broadcast,
            peer,
            socket: Mutex::new(Some(Arc::new(socket))),
            state: HandleState::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether `SO_BROADCAST` was set before binding
    pub fn broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Get the socket, failing once the handle is closed
    pub(crate) fn socket(&self) -> Result<Arc<Socket>> {
        self.socket.lock().clone().ok_or(Error::ClosedHandle)
    }

    /// Run an operation that loses to a concurrent close
    pub(crate) async fn guard<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.state.closed() => Err(Error::ClosedHandle),
            result = op => result,
        }
    }

    /// Release the socket.
    ///
    /// Returns true only for the call that actually released it.
    pub fn close(&self) -> bool {
        let released = self.socket.lock().take();
        if released.is_none() {
            return false;
        }
        self.state.close();
        debug!("Closed {} handle ({:?})", self.protocol, self.role);
        true
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    /// Peer address of a connected TCP handle
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Receive up to `max` bytes into `buf`.
    ///
    /// The payload is split off `buf`, so the caller can keep reusing the
    /// same buffer. For TCP the source is the connected peer and an empty
    /// payload means the peer closed its side. For UDP each call returns
    /// one datagram.
    pub async fn recv(&self, buf: &mut BytesMut, max: usize) -> Result<(Bytes, SocketAddr)> {
        let socket = self.socket()?;
        let peer = self.peer;
        self.guard(async move {
            buf.clear();
            buf.resize(max, 0);
            let (n, from) = match &*socket {
                Socket::Stream(stream) => {
                    let n = read_stream(stream, &mut buf[..]).await.map_err(Error::Receive)?;
                    let from = match peer {
                        Some(peer) => peer,
                        None => stream.peer_addr().map_err(Error::Receive)?,
                    };
                    (n, from)
                }
                Socket::Datagram(socket) => socket.recv_from(&mut buf[..]).await.map_err(Error::Receive)?,
                Socket::Listener(_) => {
                    return Err(Error::Unsupported("receive on a listening socket".into()))
                }
            };
            buf.truncate(n);
            Ok((buf.split().freeze(), from))
        })
        .await
    }
}

async fn read_stream(stream: &TcpStream, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        stream.readable().await?;
        match stream.try_read(buf) {
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            result => return result,
        }
    }
}
