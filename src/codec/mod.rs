//! Text codec layer
//!
//! Responsibilities:
//! - Map text to bytes and back for the supported encodings
//! - Decode incrementally without ever splitting a grapheme cluster
//!
//! This layer knows nothing about sockets.

mod decoder;

pub use decoder::{decode_message, StreamingDecoder};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Text encoding used by character-mode reads and `print`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "ascii", alias = "us-ascii", alias = "ASCII")]
    Ascii,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl Encoding {
    /// Encode text, failing on the first character the encoding cannot represent
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Ascii => self.encode_single_byte(text, 0x80),
            Encoding::Latin1 => self.encode_single_byte(text, 0x100),
        }
    }

    fn encode_single_byte(&self, text: &str, limit: u32) -> Result<Vec<u8>> {
        text.chars()
            .map(|ch| {
                if (ch as u32) < limit {
                    Ok(ch as u8)
                } else {
                    Err(Error::Encode { encoding: *self, ch })
                }
            })
            .collect()
    }

    /// Decode the longest prefix of `bytes` made of complete characters.
    ///
    /// Returns the text and the number of bytes it covers. A trailing
    /// incomplete sequence is left out; an invalid sequence yields the byte
    /// offset where it starts.
    pub(crate) fn decode_prefix(&self, bytes: &[u8]) -> std::result::Result<(String, usize), usize> {
        match self {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(text) => Ok((text.to_owned(), bytes.len())),
                Err(e) => {
                    let valid = e.valid_up_to();
                    if e.error_len().is_some() {
                        return Err(valid);
                    }
                    // Incomplete tail; everything before it is valid UTF-8
                    let text = String::from_utf8_lossy(&bytes[..valid]).into_owned();
                    Ok((text, valid))
                }
            },
            Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(at) => Err(at),
                None => Ok((bytes.iter().map(|&b| b as char).collect(), bytes.len())),
            },
            Encoding::Latin1 => Ok((bytes.iter().map(|&b| b as char).collect(), bytes.len())),
        }
    }

    /// Number of encoded bytes for text produced by `decode_prefix`
    pub(crate) fn encoded_len(&self, text: &str) -> usize {
        match self {
            Encoding::Utf8 => text.len(),
            Encoding::Ascii | Encoding::Latin1 => text.chars().count(),
        }
    }

    /// Whether a later character can still merge into the last grapheme.
    ///
    /// ASCII and Latin-1 have no combining marks, so every character they
    /// decode ends a cluster.
    pub(crate) fn can_combine(&self) -> bool {
        matches!(self, Encoding::Utf8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "latin-1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(Error::Config(format!("Unknown encoding: {}", other))),
        }
    }
}
