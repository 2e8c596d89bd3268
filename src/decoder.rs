//! Incremental UTF-8 decoding over byte chunks.
//!
//! Files are read in bounded chunks, so a multi-byte code unit may start in
//! one chunk and finish in the next. [`Utf8Decoder`] keeps the partially read
//! code unit between chunks and tracks the absolute byte offset of every
//! codepoint it returns. [`LineDecoder`] adds line and column tracking and
//! rejects NUL bytes, which almost always mean a binary file.
//!
//! ## Usage
//!
//! ```
//! use memecheck::decoder::Utf8Decoder;
//!
//! let mut decoder = Utf8Decoder::new();
//! decoder.set_source(&[0x41, 0xC3], false).unwrap();
//! assert_eq!(decoder.next().unwrap(), Some(0x41));
//! assert_eq!(decoder.next().unwrap(), None); // waiting for the rest of U+00E9
//! decoder.set_source(&[0xA9], true).unwrap();
//! assert_eq!(decoder.next().unwrap(), Some(0xE9));
//! assert_eq!(decoder.offset(), 1);
//! ```

use thiserror::Error;

/// Problems with the bytes themselves. Each carries the absolute byte offset
/// of the offending code unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid UTF-8 start byte 0x{byte:x} at offset {offset}.")]
    IllegalByte { byte: u8, offset: u64 },

    #[error("Expected {expected} bytes in the code-unit at offset {offset} but only found {found} bytes.")]
    IncompleteCodeUnit {
        expected: usize,
        found: usize,
        offset: u64,
    },

    #[error("Encoding of U+{codepoint:x} at offset {offset} used {length} bytes which is more than allowed.")]
    OverlongEncoding {
        codepoint: u32,
        length: usize,
        offset: u64,
    },

    #[error("The value U+{codepoint:x} at offset {offset} is not a legal Unicode value.")]
    InvalidCodePoint { codepoint: u32, offset: u64 },

    #[error("NUL byte at offset {offset} is not allowed in plain text.")]
    NulByte { offset: u64 },
}

impl EncodingError {
    /// Absolute byte offset of the problem.
    pub fn offset(&self) -> u64 {
        match *self {
            EncodingError::IllegalByte { offset, .. }
            | EncodingError::IncompleteCodeUnit { offset, .. }
            | EncodingError::OverlongEncoding { offset, .. }
            | EncodingError::InvalidCodePoint { offset, .. }
            | EncodingError::NulByte { offset } => offset,
        }
    }
}

/// Misuse of the decoder by its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Not finished with the current source yet!")]
    Unconsumed,

    #[error("Previous source was meant to be the last source!")]
    AfterLast,
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, EncodingError>;

/// Decodes UTF-8 codepoints from a sequence of chunks.
///
/// The current chunk is copied into an internal buffer that is reused from
/// chunk to chunk, so the decoder never holds more than one chunk.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    source: Vec<u8>,
    has_source: bool,
    last_source: bool,
    pos: usize,
    code_len: usize,
    code_read: usize,
    code_data: u32,
    code_min: u32,
    code_start: u64,
    source_offset: u64,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the decoder to its newly constructed state.
    pub fn reset(&mut self) {
        self.source.clear();
        self.has_source = false;
        self.last_source = false;
        self.pos = 0;
        self.code_len = 0;
        self.code_read = 0;
        self.code_data = 0;
        self.code_min = 0;
        self.code_start = 0;
        self.source_offset = 0;
    }

    /// Installs the next chunk.
    ///
    /// Fails if the previous chunk still has unread bytes or was marked as
    /// the last one.
    pub fn set_source(&mut self, chunk: &[u8], last: bool) -> Result<(), SourceError> {
        if self.has_source && self.pos < self.source.len() {
            return Err(SourceError::Unconsumed);
        }
        if self.last_source {
            return Err(SourceError::AfterLast);
        }
        self.source_offset += self.source.len() as u64;
        self.source.clear();
        self.source.extend_from_slice(chunk);
        self.has_source = true;
        self.pos = 0;
        self.last_source = last;
        Ok(())
    }

    /// Position in the current chunk.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Position across all chunks seen so far.
    pub fn blob_position(&self) -> u64 {
        self.source_offset + self.pos as u64
    }

    /// Byte offset of the codepoint last returned by [`next`](Self::next),
    /// or of the start of the incomplete code unit when it returned `None`.
    pub fn offset(&self) -> u64 {
        self.code_start
    }

    /// True once every byte of the current chunk has been read.
    pub fn is_exhausted(&self) -> bool {
        !self.has_source || self.pos >= self.source.len()
    }

    /// Decodes the next codepoint.
    ///
    /// Returns `Ok(None)` when the chunk is exhausted, including when a
    /// multi-byte code unit continues in the next chunk. On the last chunk a
    /// truncated code unit is an error instead.
    pub fn next(&mut self) -> DecodeResult<Option<u32>> {
        if self.is_exhausted() && self.code_read == self.code_len {
            self.code_len = 0;
            self.code_read = 0;
            self.code_start = self.blob_position();
            return Ok(None);
        }
        if self.code_len == self.code_read {
            let byte = self.source[self.pos];
            self.code_start = self.blob_position();
            self.pos += 1;
            if byte <= 127 {
                self.code_len = 0;
                self.code_read = 0;
                return Ok(Some(byte as u32));
            }
            let (len, data, min) = match byte {
                b if b & 0xE0 == 0xC0 => (2, b & 0x1F, 0x7F),
                b if b & 0xF0 == 0xE0 => (3, b & 0x0F, 0x7FF),
                b if b & 0xF8 == 0xF0 => (4, b & 0x07, 0xFFFF),
                b if b & 0xFC == 0xF8 => (5, b & 0x03, 0x1F_FFFF),
                b if b & 0xFE == 0xFC => (6, b & 0x01, 0x3FF_FFFF),
                // a stray 10xxxxxx or one of 0xFE / 0xFF
                _ => {
                    self.code_len = 0;
                    self.code_read = 0;
                    return Err(EncodingError::IllegalByte {
                        byte,
                        offset: self.code_start,
                    });
                }
            };
            self.code_len = len;
            self.code_data = data as u32;
            self.code_min = min;
            self.code_read = 1;
        }
        while self.pos < self.source.len() && self.code_read < self.code_len {
            let byte = self.source[self.pos];
            if byte & 0xC0 != 0x80 {
                let expected = self.code_len;
                let found = self.code_read;
                self.code_len = 0;
                self.code_read = 0;
                return Err(EncodingError::IncompleteCodeUnit {
                    expected,
                    found,
                    offset: self.code_start,
                });
            }
            self.code_data = (self.code_data << 6) | (byte & 0x3F) as u32;
            self.pos += 1;
            self.code_read += 1;
        }
        if self.code_read == self.code_len {
            let length = self.code_len;
            self.code_len = 0;
            self.code_read = 0;
            if self.code_data <= self.code_min {
                return Err(EncodingError::OverlongEncoding {
                    codepoint: self.code_data,
                    length,
                    offset: self.code_start,
                });
            }
            if self.code_data > 0x10_FFFF {
                return Err(EncodingError::InvalidCodePoint {
                    codepoint: self.code_data,
                    offset: self.code_start,
                });
            }
            Ok(Some(self.code_data))
        } else if self.last_source {
            let expected = self.code_len;
            let found = self.code_read;
            self.code_len = 0;
            self.code_read = 0;
            Err(EncodingError::IncompleteCodeUnit {
                expected,
                found,
                offset: self.code_start,
            })
        } else {
            Ok(None)
        }
    }
}

/// A [`Utf8Decoder`] that also tracks 0-based line and column numbers.
///
/// CR, LF and CRLF each count as one line break. A second newline character
/// only starts another line when it repeats the previous one (`\n\n`) or
/// when the previous one did not itself start a line break.
#[derive(Debug, Default)]
pub struct LineDecoder {
    inner: Utf8Decoder,
    line_num: u64,
    col_num: Option<u64>,
    last_codepoint: u32,
    last_is_nl: bool,
    last_is_nl_start: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_source(&mut self, chunk: &[u8], last: bool) -> Result<(), SourceError> {
        self.inner.set_source(chunk, last)
    }

    pub fn position(&self) -> usize {
        self.inner.position()
    }

    pub fn blob_position(&self) -> u64 {
        self.inner.blob_position()
    }

    pub fn offset(&self) -> u64 {
        self.inner.offset()
    }

    /// Line of the codepoint last returned.
    pub fn line(&self) -> u64 {
        self.line_num
    }

    /// Column of the codepoint last returned.
    pub fn column(&self) -> u64 {
        self.col_num.unwrap_or(0)
    }

    /// Decodes the next codepoint and updates the line and column.
    pub fn next(&mut self) -> DecodeResult<Option<u32>> {
        let codepoint = match self.inner.next()? {
            Some(cp) => cp,
            None => return Ok(None),
        };
        if codepoint == 0 {
            return Err(EncodingError::NulByte {
                offset: self.inner.offset(),
            });
        }
        self.col_num = Some(self.col_num.map_or(0, |c| c + 1));
        let is_nl = codepoint == 10 || codepoint == 13;
        let mut is_nl_start = false;
        if self.last_is_nl {
            if !is_nl {
                self.new_line();
            } else if self.last_codepoint == codepoint || !self.last_is_nl_start {
                self.new_line();
                is_nl_start = true;
            }
        } else if is_nl {
            is_nl_start = true;
        }
        self.last_codepoint = codepoint;
        self.last_is_nl = is_nl;
        self.last_is_nl_start = is_nl_start;
        Ok(Some(codepoint))
    }

    fn new_line(&mut self) {
        self.line_num += 1;
        self.col_num = Some(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn decode_all(chunks: &[&[u8]]) -> Result<Vec<u32>, EncodingError> {
        let mut decoder = Utf8Decoder::new();
        let mut out = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            decoder.set_source(chunk, i + 1 == chunks.len()).unwrap();
            while let Some(cp) = decoder.next()? {
                out.push(cp);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_ascii_and_multibyte() {
        let text = "a\u{e9}\u{20ac}\u{1F600}z";
        let cps = decode_all(&[text.as_bytes()]).unwrap();
        let expected: Vec<u32> = text.chars().map(|c| c as u32).collect();
        assert_eq!(cps, expected);
    }

    #[test]
    fn test_random_chunk_splits_match_whole_input() {
        let text = "ACGT \u{e9}t\u{e9} \u{4e16}\u{754c} \u{1F9EC}\n>seq\r\nNNNN\u{3b1}\u{3b2}";
        let bytes = text.as_bytes();
        let whole = decode_all(&[bytes]).unwrap();
        let mut rng = rand::rng();
        for _ in 0..200 {
            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            while start < bytes.len() {
                let len = rng.random_range(1..=5).min(bytes.len() - start);
                chunks.push(&bytes[start..start + len]);
                start += len;
            }
            assert_eq!(decode_all(&chunks).unwrap(), whole);
        }
    }

    #[test]
    fn test_offsets_across_chunks() {
        let mut decoder = Utf8Decoder::new();
        decoder.set_source(b"ab\xE2\x82", false).unwrap();
        assert_eq!(decoder.next().unwrap(), Some(b'a' as u32));
        assert_eq!(decoder.offset(), 0);
        assert_eq!(decoder.next().unwrap(), Some(b'b' as u32));
        assert_eq!(decoder.offset(), 1);
        assert_eq!(decoder.next().unwrap(), None);
        assert_eq!(decoder.offset(), 2);
        decoder.set_source(b"\xACc", true).unwrap();
        assert_eq!(decoder.next().unwrap(), Some(0x20AC));
        assert_eq!(decoder.offset(), 2);
        assert_eq!(decoder.next().unwrap(), Some(b'c' as u32));
        assert_eq!(decoder.offset(), 5);
        assert_eq!(decoder.blob_position(), 6);
    }

    #[test]
    fn test_set_source_misuse() {
        let mut decoder = Utf8Decoder::new();
        decoder.set_source(b"abc", false).unwrap();
        decoder.next().unwrap();
        assert_eq!(decoder.set_source(b"d", false), Err(SourceError::Unconsumed));
        while decoder.next().unwrap().is_some() {}
        decoder.set_source(b"d", true).unwrap();
        while decoder.next().unwrap().is_some() {}
        assert_eq!(decoder.set_source(b"e", true), Err(SourceError::AfterLast));
    }

    #[test]
    fn test_illegal_start_byte() {
        let err = decode_all(&[b"ab\xFFc"]).unwrap_err();
        assert_eq!(err, EncodingError::IllegalByte { byte: 0xFF, offset: 2 });
        assert_eq!(err.to_string(), "Invalid UTF-8 start byte 0xff at offset 2.");
    }

    #[test]
    fn test_bad_continuation() {
        let err = decode_all(&[b"x\xE2\x82A"]).unwrap_err();
        assert_eq!(
            err,
            EncodingError::IncompleteCodeUnit { expected: 3, found: 2, offset: 1 }
        );
    }

    #[test]
    fn test_truncated_last_chunk() {
        let err = decode_all(&[b"x", b"\xE2\x82"]).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::IncompleteCodeUnit { expected: 3, found: 2, offset: 1 }
        ));
    }

    #[test]
    fn test_overlong_and_out_of_range() {
        let err = decode_all(&[b"\xC0\xAF"]).unwrap_err();
        assert!(matches!(err, EncodingError::OverlongEncoding { codepoint: 0x2F, length: 2, offset: 0 }));
        let err = decode_all(&[b"\xF4\x90\x80\x80"]).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidCodePoint { codepoint: 0x110000, .. }));
    }

    #[test]
    fn test_raw_decoder_allows_nul() {
        assert_eq!(decode_all(&[b"a\0b"]).unwrap(), vec![97, 0, 98]);
    }

    fn positions(text: &[u8]) -> Vec<(u64, u64)> {
        let mut decoder = LineDecoder::new();
        decoder.set_source(text, true).unwrap();
        let mut out = Vec::new();
        while let Some(_) = decoder.next().unwrap() {
            out.push((decoder.line(), decoder.column()));
        }
        out
    }

    #[test]
    fn test_line_breaks() {
        // LF, CRLF and CR each end exactly one line
        assert_eq!(
            positions(b"a\nb\r\nc\rd"),
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 0), (2, 1), (3, 0)]
        );
        // blank lines
        assert_eq!(positions(b"a\n\nb"), vec![(0, 0), (0, 1), (1, 0), (2, 0)]);
        assert_eq!(
            positions(b"a\r\n\r\nb"),
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (2, 0)]
        );
        // LF CR pairs up like CR LF
        assert_eq!(positions(b"a\n\rb"), vec![(0, 0), (0, 1), (0, 2), (1, 0)]);
    }

    #[test]
    fn test_line_decoder_rejects_nul() {
        let mut decoder = LineDecoder::new();
        decoder.set_source(b"ab\0", true).unwrap();
        decoder.next().unwrap();
        decoder.next().unwrap();
        assert_eq!(decoder.next(), Err(EncodingError::NulByte { offset: 2 }));
    }
}
