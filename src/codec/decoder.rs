//! Incremental grapheme-aware decoder
//!
//! Bytes arrive in arbitrary chunks. The decoder keeps whatever cannot be
//! emitted yet: an incomplete multi-byte sequence, or a trailing grapheme
//! that a combining mark in the next chunk could still extend.

use bytes::{Buf, BytesMut};
use tracing::trace;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

use super::Encoding;

/// Stateful byte-to-text decoder that only emits complete grapheme clusters
#[derive(Debug)]
pub struct StreamingDecoder {
    encoding: Encoding,
    pending: BytesMut,
    /// Bytes consumed so far, for error offsets
    consumed: usize,
    failed: bool,
}

impl StreamingDecoder {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: BytesMut::new(),
            consumed: 0,
            failed: false,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Bytes buffered but not yet emitted
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Drop buffered bytes and clear a previous failure
    pub fn reset(&mut self) {
        self.pending.clear();
        self.consumed = 0;
        self.failed = false;
    }

    /// Feed a chunk and return the text that became complete.
    ///
    /// The returned text may be empty. After a decode error the decoder is
    /// failed: the error is returned once and later calls yield nothing.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<String> {
        if self.failed {
            return Ok(String::new());
        }
        self.pending.extend_from_slice(bytes);

        let (text, _) = match self.encoding.decode_prefix(&self.pending) {
            Ok(decoded) => decoded,
            Err(at) => return Err(self.fail(at)),
        };

        let emit = if self.encoding.can_combine() {
            hold_back_from(&text)
        } else {
            text.len()
        };
        let text = &text[..emit];

        self.advance(self.encoding.encoded_len(text));
        trace!(
            "decoder: emitted {} bytes of text, {} pending",
            text.len(),
            self.pending.len()
        );
        Ok(text.to_owned())
    }

    /// Flush at end of input.
    ///
    /// Held-back text is emitted; bytes that never formed a character are a
    /// decode error.
    pub fn finish(&mut self) -> Result<String> {
        if self.failed {
            return Ok(String::new());
        }

        let (text, used) = match self.encoding.decode_prefix(&self.pending) {
            Ok(decoded) => decoded,
            Err(at) => return Err(self.fail(at)),
        };
        if used < self.pending.len() {
            return Err(self.fail(used));
        }

        self.advance(used);
        Ok(text)
    }

    fn advance(&mut self, n: usize) {
        self.pending.advance(n);
        self.consumed += n;
    }

    fn fail(&mut self, at: usize) -> Error {
        self.failed = true;
        self.pending.clear();
        Error::Decode {
            encoding: self.encoding,
            offset: self.consumed + at,
        }
    }
}

/// Byte index where the trailing, possibly unfinished grapheme starts.
///
/// A grapheme ending in a break trigger is complete: nothing can combine
/// with a newline, NUL or line separator.
fn hold_back_from(text: &str) -> usize {
    match text.grapheme_indices(true).next_back() {
        Some((start, grapheme)) if !ends_with_break_trigger(grapheme) => start,
        _ => text.len(),
    }
}

fn ends_with_break_trigger(grapheme: &str) -> bool {
    grapheme.chars().next_back().is_some_and(is_break_trigger)
}

/// Whether the segmenter always breaks after `c`.
///
/// Covers the grapheme Control class (Cc, Zl, Zp and most Cf) plus CR and
/// LF. A combining mark extends anything else, so a break between `c` and
/// U+0301 only happens for these.
fn is_break_trigger(c: char) -> bool {
    if c.is_control() {
        return true;
    }
    let mut pair = String::with_capacity(c.len_utf8() + 2);
    pair.push(c);
    pair.push('\u{301}');
    pair.graphemes(true).nth(1).is_some()
}

/// Decode one self-contained message, such as a datagram.
///
/// Nothing is carried over: a trailing partial sequence is an error for
/// this message.
pub fn decode_message(encoding: Encoding, bytes: &[u8]) -> Result<String> {
    let mut decoder = StreamingDecoder::new(encoding);
    let mut text = decoder.feed(bytes)?;
    text.push_str(&decoder.finish()?);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "plain ascii\n",
        "h\u{e9}llo w\u{f6}rld\n",
        "e\u{301}t\u{e9}\n",
        "\u{1f600} and \u{1f468}\u{200d}\u{1f469}\u{200d}\u{1f467}!",
        "line one\nline two\0tail",
        "\u{20ac}\u{20ac}\u{20ac}",
    ];

    fn feed_chunks(chunks: &[&[u8]]) -> (Vec<String>, String) {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        let mut batches = Vec::new();
        for chunk in chunks {
            let text = decoder.feed(chunk).unwrap();
            if !text.is_empty() {
                batches.push(text);
            }
        }
        let tail = decoder.finish().unwrap();
        if !tail.is_empty() {
            batches.push(tail);
        }
        let joined = batches.concat();
        (batches, joined)
    }

    #[test]
    fn test_split_anywhere_matches_whole() {
        for sample in SAMPLES {
            let bytes = sample.as_bytes();
            let whole = decode_message(Encoding::Utf8, bytes).unwrap();
            assert_eq!(&whole, sample);

            for i in 0..=bytes.len() {
                for j in i..=bytes.len() {
                    let (_, joined) = feed_chunks(&[&bytes[..i], &bytes[i..j], &bytes[j..]]);
                    assert_eq!(joined, whole, "split at {} and {}", i, j);
                }
            }
        }
    }

    #[test]
    fn test_batches_end_on_grapheme_boundaries() {
        for sample in SAMPLES {
            let bytes = sample.as_bytes();
            let mut boundaries: Vec<usize> = sample.grapheme_indices(true).map(|(i, _)| i).collect();
            boundaries.push(sample.len());

            for i in 0..=bytes.len() {
                let (batches, _) = feed_chunks(&[&bytes[..i], &bytes[i..]]);
                let mut end = 0;
                for batch in &batches {
                    end += batch.len();
                    assert!(
                        boundaries.contains(&end),
                        "batch ends inside a grapheme of {:?} (split {})",
                        sample,
                        i
                    );
                }
            }
        }
    }

    #[test]
    fn test_partial_multibyte_is_buffered() {
        // "€" is E2 82 AC
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        assert_eq!(decoder.feed(b"\n\xE2\x82").unwrap(), "\n");
        assert_eq!(decoder.pending(), b"\xE2\x82");

        assert_eq!(decoder.feed(b"\xAC").unwrap(), "");
        assert_eq!(decoder.feed(b"\n").unwrap(), "\u{20ac}\n");
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_trailing_grapheme_waits_for_combining_mark() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        assert_eq!(decoder.feed(b"cafe").unwrap(), "caf");
        // U+0301 COMBINING ACUTE ACCENT
        assert_eq!(decoder.feed("\u{301}!".as_bytes()).unwrap(), "e\u{301}");
        assert_eq!(decoder.finish().unwrap(), "!");
    }

    #[test]
    fn test_control_character_closes_cluster() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        assert_eq!(decoder.feed(b"abc\n").unwrap(), "abc\n");
        assert_eq!(decoder.feed(b"x\0").unwrap(), "x\0");
        // A combining mark after a newline starts a new cluster
        assert_eq!(decoder.feed("\u{301}".as_bytes()).unwrap(), "");
        assert_eq!(decoder.finish().unwrap(), "\u{301}");
    }

    #[test]
    fn test_separators_close_cluster() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        // U+2028 LINE SEPARATOR, U+2029 PARAGRAPH SEPARATOR, U+200B ZERO WIDTH SPACE
        assert_eq!(decoder.feed("line\u{2028}".as_bytes()).unwrap(), "line\u{2028}");
        assert_eq!(decoder.feed("para\u{2029}".as_bytes()).unwrap(), "para\u{2029}");
        assert_eq!(decoder.feed("gap\u{200b}".as_bytes()).unwrap(), "gap\u{200b}");
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_joiner_keeps_cluster_open() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        // A zero width joiner extends the cluster, so it is not a boundary
        assert_eq!(decoder.feed("ab\u{200d}".as_bytes()).unwrap(), "a");
        assert_eq!(decoder.finish().unwrap(), "b\u{200d}");
    }

    #[test]
    fn test_break_triggers() {
        for c in ['\n', '\r', '\0', '\u{2028}', '\u{2029}', '\u{200b}', '\u{feff}'] {
            assert!(is_break_trigger(c), "{:?}", c);
        }
        for c in ['a', '\u{e9}', '\u{200d}', '\u{301}', '\u{1f600}'] {
            assert!(!is_break_trigger(c), "{:?}", c);
        }
    }

    #[test]
    fn test_invalid_sequence_fails_once() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        assert_eq!(decoder.feed(b"ok\n").unwrap(), "ok\n");

        let err = decoder.feed(b"\xFFmore").unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 3, .. }));
        assert!(decoder.is_failed());

        assert_eq!(decoder.feed(b"still going\n").unwrap(), "");
        assert_eq!(decoder.finish().unwrap(), "");
    }

    #[test]
    fn test_finish_rejects_truncated_sequence() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        assert_eq!(decoder.feed(b"a\n\xE2\x82").unwrap(), "a\n");
        assert!(matches!(decoder.finish(), Err(Error::Decode { offset: 2, .. })));
    }

    #[test]
    fn test_reset_clears_failure() {
        let mut decoder = StreamingDecoder::new(Encoding::Utf8);
        assert!(decoder.feed(b"\xC0").is_err());
        decoder.reset();
        assert_eq!(decoder.feed(b"fine\n").unwrap(), "fine\n");
    }

    #[test]
    fn test_single_byte_encodings_emit_everything() {
        let mut decoder = StreamingDecoder::new(Encoding::Latin1);
        assert_eq!(decoder.feed(b"caf\xE9").unwrap(), "caf\u{e9}");

        let mut decoder = StreamingDecoder::new(Encoding::Ascii);
        assert_eq!(decoder.feed(b"abc").unwrap(), "abc");
        assert!(decoder.feed(b"\xE9").is_err());
    }

    #[test]
    fn test_decode_message() {
        assert_eq!(decode_message(Encoding::Utf8, b"Hello").unwrap(), "Hello");
        assert!(decode_message(Encoding::Utf8, b"Hell\xC3").is_err());
        assert_eq!(decode_message(Encoding::Utf8, b"").unwrap(), "");
    }
}
