//! Transport Layer
//!
//! Responsibilities:
//! - Resolve host/port pairs into endpoints
//! - Own raw OS sockets (TCP stream, TCP listener, UDP)
//! - NO decoding, NO buffering beyond a single receive
//!
//! This layer ONLY deals with raw bytes and socket lifecycle.

mod handle;
mod resolve;
mod tcp;
mod udp;

pub use handle::{Protocol, RawSocket, Role};
pub use resolve::{resolve, Purpose};
