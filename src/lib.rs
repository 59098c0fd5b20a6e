//! async-socket - Async TCP/UDP sockets with grapheme-aware text decoding
//!
//! # Architecture
//!
//! ```text
//! AsyncSocket (facade)
//! → Resolver
//! → RawSocket (TCP stream / TCP listener / UDP)
//! → Listener (servers) | Connection (clients, accepted peers, UDP)
//! → StreamingDecoder (character mode)
//! → DataStream
//! ```
//!
//! ## Core Principles
//!
//! - Every OS socket has exactly one owner
//! - Writes are futures, reads are streams
//! - Text is only ever emitted as whole grapheme clusters
//! - Closing is always safe and never fails
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Endpoint
//! ├── transport/       # Resolver and raw socket handles
//! ├── codec/           # Encodings and the streaming decoder
//! ├── connection/      # Connection and its data stream
//! ├── listener.rs      # Lazy stream of accepted connections
//! └── socket.rs        # AsyncSocket entry points
//! ```

// Core types
pub mod common;
pub mod error;

// Layered architecture
pub mod codec;
pub mod connection;
pub mod listener;
pub mod socket;
pub mod transport;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::Endpoint;
pub use config::{Config, DataMode, ReadOptions, SocketConfig};
pub use error::{Error, Result};

pub use codec::{Encoding, StreamingDecoder};
pub use connection::{Connection, ConnectionState, Data, DataStream};
pub use listener::Listener;
pub use socket::AsyncSocket;
pub use transport::Protocol;
