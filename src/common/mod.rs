//! Common types
//!
//! - Endpoint: resolved host/port pair

mod endpoint;

pub use endpoint::Endpoint;
