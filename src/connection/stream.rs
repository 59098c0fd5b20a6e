//! Data stream - push-based sequence of received data
//!
//! Each stream owns its decoder; nothing is shared between two streams of
//! the same connection except the socket.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use tracing::{trace, warn};

use crate::codec::{decode_message, StreamingDecoder};
use crate::config::{DataMode, ReadOptions};
use crate::error::{Error, Result};
use crate::transport::Protocol;

use super::Shared;

/// One element of a data stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Raw payload (byte mode)
    Bytes(Bytes),
    /// Complete grapheme clusters (character mode)
    Text(String),
}

impl Data {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Data::Bytes(bytes) => bytes,
            Data::Text(text) => text.as_bytes(),
        }
    }

    /// Get the text of a character-mode element
    pub fn into_text(self) -> Option<String> {
        match self {
            Data::Text(text) => Some(text),
            Data::Bytes(_) => None,
        }
    }
}

/// Lazy, cancelable stream of received data.
///
/// Nothing is read until the stream is polled; dropping it stops reading.
/// The stream ends normally when the peer closes a TCP connection or the
/// connection is closed locally, and abnormally (one `Err`, then the end)
/// on a receive or decode failure.
pub struct DataStream {
    inner: BoxStream<'static, Result<Data>>,
}

impl DataStream {
    pub(crate) fn new(shared: Arc<Shared>, options: ReadOptions) -> Self {
        let decoder = match (options.mode, shared.handle.protocol()) {
            (DataMode::Characters, Protocol::Tcp) => Some(StreamingDecoder::new(shared.encoding)),
            _ => None,
        };
        let buffer = options.buffer.unwrap_or(shared.buffer_size).max(1);
        let state = ReadState {
            read_buf: BytesMut::with_capacity(buffer),
            buffer,
            mode: options.mode,
            decoder,
            shared,
            done: false,
        };

        let inner = stream::unfold(state, |mut state| async move {
            let item = state.next().await?;
            Some((item, state))
        })
        .boxed();

        Self { inner }
    }
}

impl Stream for DataStream {
    type Item = Result<Data>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

struct ReadState {
    shared: Arc<Shared>,
    mode: DataMode,
    buffer: usize,
    read_buf: BytesMut,
    /// Present only for character-mode TCP
    decoder: Option<StreamingDecoder>,
    done: bool,
}

impl ReadState {
    async fn next(&mut self) -> Option<Result<Data>> {
        while !self.done {
            let payload = match self.shared.handle.recv(&mut self.read_buf, self.buffer).await {
                Ok((payload, from)) => {
                    trace!("Received {} bytes from {}", payload.len(), from);
                    payload
                }
                Err(Error::ClosedHandle) => return self.finish(None),
                Err(e) => {
                    self.shared.fail(&e);
                    return self.finish(Some(Err(e)));
                }
            };

            // Closed while the receive was completing: drop the stale payload
            if self.shared.handle.is_closed() {
                return self.finish(None);
            }

            let item = match self.shared.handle.protocol() {
                Protocol::Tcp => self.on_stream_chunk(payload),
                Protocol::Udp => self.on_datagram(payload),
            };
            if item.is_some() {
                return item;
            }
        }
        None
    }

    fn on_stream_chunk(&mut self, payload: Bytes) -> Option<Result<Data>> {
        let eof = payload.is_empty();
        let decoded = match self.decoder.as_mut() {
            None if eof => {
                self.done = true;
                return None;
            }
            None => return Some(Ok(Data::Bytes(payload))),
            Some(decoder) if eof => {
                self.done = true;
                decoder.finish()
            }
            Some(decoder) => decoder.feed(&payload),
        };

        match decoded {
            Ok(text) if text.is_empty() => None,
            Ok(text) => Some(Ok(Data::Text(text))),
            Err(e) => {
                self.shared.fail(&e);
                self.finish(Some(Err(e)))
            }
        }
    }

    /// Each datagram decodes on its own; a bad one ends this stream but
    /// leaves the socket open for the next reader.
    fn on_datagram(&mut self, payload: Bytes) -> Option<Result<Data>> {
        if self.mode == DataMode::Bytes {
            return Some(Ok(Data::Bytes(payload)));
        }
        match decode_message(self.shared.encoding, &payload) {
            Ok(text) => Some(Ok(Data::Text(text))),
            Err(e) => {
                warn!("Dropping undecodable datagram: {}", e);
                self.finish(Some(Err(e)))
            }
        }
    }

    fn finish(&mut self, last: Option<Result<Data>>) -> Option<Result<Data>> {
        self.done = true;
        last
    }
}
