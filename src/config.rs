//! Configuration module for async-socket
//!
//! Supports JSON configuration; every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::Encoding;
use crate::error::{Error, Result};

/// Default receive buffer size (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Socket defaults
    #[serde(default)]
    pub socket: SocketConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.socket.validate()?;
        Ok(config)
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Per-socket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Encoding for character-mode reads and `print`
    #[serde(default)]
    pub encoding: Encoding,

    /// Receive buffer size when a read does not override it
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Allow UDP sends to the broadcast address
    #[serde(default)]
    pub broadcast: bool,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Disable Nagle's algorithm on TCP connections
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_nodelay() -> bool {
    true
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            buffer_size: default_buffer_size(),
            broadcast: false,
            backlog: default_backlog(),
            nodelay: default_nodelay(),
        }
    }
}

impl SocketConfig {
    /// Builder: set broadcast capability
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Builder: set encoding
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Builder: set default receive buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than 0".into()));
        }
        if self.backlog == 0 {
            return Err(Error::Config("backlog must be greater than 0".into()));
        }
        Ok(())
    }
}

/// How a data stream hands out received data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// Raw payloads
    Bytes,
    /// Decoded text, whole grapheme clusters only
    #[default]
    Characters,
}

/// Options for a single data stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub mode: DataMode,
    /// Overrides the configured receive buffer size
    pub buffer: Option<usize>,
}

impl ReadOptions {
    pub fn bytes() -> Self {
        Self {
            mode: DataMode::Bytes,
            buffer: None,
        }
    }

    pub fn characters() -> Self {
        Self {
            mode: DataMode::Characters,
            buffer: None,
        }
    }

    /// Builder: override the receive buffer size
    pub fn with_buffer(mut self, size: usize) -> Self {
        self.buffer = Some(size);
        self
    }
}
