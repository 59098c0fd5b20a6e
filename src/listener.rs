//! TCP listener as a lazy stream of connections
//!
//! Nothing is bound until the stream is first polled (or [`Listener::bound`]
//! is awaited). Dropping the listener closes the listening socket; the
//! connections it already produced live on independently.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream};
use tracing::debug;

use crate::common::Endpoint;
use crate::config::SocketConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::{resolve, Purpose, RawSocket};

enum ListenerState {
    Idle,
    Binding(BoxFuture<'static, Result<RawSocket>>),
    Listening {
        handle: Arc<RawSocket>,
        accept: Option<BoxFuture<'static, Result<RawSocket>>>,
    },
    Done,
}

/// Stream of accepted TCP connections
pub struct Listener {
    host: String,
    port: u16,
    config: SocketConfig,
    local: Option<Endpoint>,
    state: ListenerState,
}

impl Listener {
    pub(crate) fn new(host: impl Into<String>, port: u16, config: SocketConfig) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            local: None,
            state: ListenerState::Idle,
        }
    }

    /// Local endpoint once bound
    pub fn local_endpoint(&self) -> Option<&Endpoint> {
        self.local.as_ref()
    }

    /// Bind now if that has not happened yet and report the local endpoint.
    ///
    /// Useful with port 0, where the OS picks the port.
    pub async fn bound(&mut self) -> Result<Endpoint> {
        if let ListenerState::Idle = self.state {
            self.state = ListenerState::Binding(self.bind_future());
        }
        if let ListenerState::Binding(binding) = &mut self.state {
            match binding.await {
                Ok(handle) => self.on_bound(handle),
                Err(e) => {
                    self.state = ListenerState::Done;
                    return Err(e);
                }
            }
        }
        match (&self.state, &self.local) {
            (ListenerState::Listening { .. }, Some(local)) => Ok(local.clone()),
            _ => Err(Error::ClosedHandle),
        }
    }

    /// Stop accepting and close the listening socket
    pub fn close(&mut self) {
        if let ListenerState::Listening { handle, .. } = &self.state {
            if handle.close() {
                debug!("Stopped listening on {}:{}", self.host, self.port);
            }
        }
        self.state = ListenerState::Done;
    }

    fn bind_future(&self) -> BoxFuture<'static, Result<RawSocket>> {
        let host = self.host.clone();
        let port = self.port;
        let config = self.config.clone();
        async move {
            config.validate()?;
            let endpoint = resolve(&host, port, Purpose::Bind).await?;
            RawSocket::bind_listen(&endpoint, config.backlog).await
        }
        .boxed()
    }

    fn on_bound(&mut self, handle: RawSocket) {
        self.local = handle.local_addr().ok().map(Endpoint::from);
        self.state = ListenerState::Listening {
            handle: Arc::new(handle),
            accept: None,
        };
    }
}

impl Stream for Listener {
    type Item = Result<Connection>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                ListenerState::Idle => {
                    this.state = ListenerState::Binding(this.bind_future());
                }
                ListenerState::Binding(binding) => match ready!(binding.poll_unpin(cx)) {
                    Ok(handle) => this.on_bound(handle),
                    Err(e) => {
                        this.state = ListenerState::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                ListenerState::Listening { handle, accept } => {
                    let nodelay = this.config.nodelay;
                    let pending = accept.get_or_insert_with(|| {
                        let handle = Arc::clone(handle);
                        async move { handle.accept(nodelay).await }.boxed()
                    });
                    let accepted = ready!(pending.poll_unpin(cx));
                    *accept = None;

                    let connection = accepted.and_then(|handle| {
                        let peer = handle.peer_addr().map(Endpoint::from);
                        Connection::new(handle, &this.config, peer)
                    });
                    return match connection {
                        Ok(connection) => Poll::Ready(Some(Ok(connection))),
                        Err(Error::ClosedHandle) => {
                            this.close();
                            Poll::Ready(None)
                        }
                        Err(e) => {
                            this.close();
                            Poll::Ready(Some(Err(e)))
                        }
                    };
                }
                ListenerState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}
