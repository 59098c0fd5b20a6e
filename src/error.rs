//! Error types for async-socket

use std::io;

use thiserror::Error;

use crate::codec::Encoding;

/// Main error type for async-socket
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot resolve {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Bind to {endpoint} failed: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    /// `sent` is the number of bytes handed to the OS before the failure.
    #[error("Send failed after {sent} bytes: {source}")]
    Send {
        sent: usize,
        #[source]
        source: io::Error,
    },

    #[error("Receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("Malformed {encoding} input at byte {offset}")]
    Decode { encoding: Encoding, offset: usize },

    #[error("Character {ch:?} cannot be encoded as {encoding}")]
    Encode { encoding: Encoding, ch: char },

    #[error("Socket handle is closed")]
    ClosedHandle,

    #[error("Broadcast is not enabled on this socket (destination {0})")]
    BroadcastDenied(String),

    #[error("No destination endpoint for datagram")]
    NoDestination,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for permission-class failures, including a refused broadcast.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::BroadcastDenied(_) => true,
            Error::Bind { source, .. } | Error::Send { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            Error::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// True if the operation failed because the handle was closed under it.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ClosedHandle)
    }
}

/// Result type alias for async-socket
pub type Result<T> = std::result::Result<T, Error>;
