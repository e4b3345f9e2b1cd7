//! Incremental decoding of a single JSON array out of a larger document.
//!
//! [`ArrayStream`] finds the array stored under a named key and yields its
//! elements one at a time. Only the undecoded tail of the input is buffered,
//! so arbitrarily large documents can be walked with roughly one chunk of
//! memory plus the largest element.
//!
//! ```
//! use logprobs::ArrayStream;
//! use serde_json::json;
//!
//! let doc = r#"{"choices":[{"logprobs":{"content":[{"token":"a"},{"token":"b"}]}}]}"#;
//! let tokens: Vec<_> = ArrayStream::new(doc.as_bytes(), "content")
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(tokens, vec![json!({"token": "a"}), json!({"token": "b"})]);
//! ```
use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Deserializer, Value};
use tracing::{debug, trace, warn};

use crate::error::StreamError;

/// Number of bytes requested from the reader per refill.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Outcome of one attempt to decode a value at the start of the buffer.
#[derive(Debug)]
enum DecodeStep<T> {
    Complete { value: T, consumed: usize },
    /// The buffer ends before the value does.
    Incomplete,
    Invalid(serde_json::Error),
}

/// What follows a located key.
#[derive(Debug, PartialEq, Eq)]
enum Lookahead {
    /// The key's value is an array; elements start this many bytes on.
    Array(usize),
    /// The key holds something other than an array.
    Other,
    /// Not enough bytes buffered to tell.
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Locate,
    /// Just past `[`.
    First,
    /// After an element, expecting `,` or `]`.
    Separator,
    /// After `,`, expecting an element.
    Element,
    Done,
}

/// Lazily yields the elements of the JSON array stored under `key`.
///
/// The stream owns its reader; dropping the stream (for example after taking
/// only the first few elements) releases it. A document without the key or
/// one that ends mid-element simply ends the sequence, while bytes that
/// cannot be JSON produce a [`StreamError`] and end it as well.
pub struct ArrayStream<R, T = Value> {
    reader: R,
    key: Vec<u8>,
    buf: Vec<u8>,
    chunk_size: usize,
    offset: u64,
    eof: bool,
    state: State,
    _marker: PhantomData<fn() -> T>,
}

impl<R: Read> ArrayStream<R> {
    /// Stream the array under `key` as untyped JSON values.
    pub fn new(reader: R, key: &str) -> Self {
        Self::typed(reader, key)
    }
}

impl<R: Read, T: DeserializeOwned> ArrayStream<R, T> {
    /// Stream the array under `key`, decoding every element into `T`.
    ///
    /// An element that does not fit `T` is reported as malformed.
    pub fn typed(reader: R, key: &str) -> Self {
        Self {
            reader,
            key: Value::String(key.to_owned()).to_string().into_bytes(),
            buf: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            offset: 0,
            eof: false,
            state: State::Locate,
            _marker: PhantomData,
        }
    }

    /// Read `chunk_size` bytes per refill instead of [`DEFAULT_CHUNK_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Absolute byte offset of the first buffered, not yet decoded byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Give back the reader, positioned wherever decoding stopped.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
        self.offset += n as u64;
    }

    fn skip_whitespace(&mut self) {
        let n = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.consume(n);
    }

    /// Append one chunk from the reader. Returns `false` once the reader is exhausted.
    fn fill(&mut self) -> Result<bool, StreamError> {
        if self.eof {
            return Ok(false);
        }
        let start = self.buf.len();
        self.buf.resize(start + self.chunk_size, 0);
        let read = loop {
            match self.reader.read(&mut self.buf[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        };
        self.buf.truncate(start + read);
        self.eof = read == 0;
        trace!(read, buffered = self.buf.len(), "refill");
        Ok(!self.eof)
    }

    fn locate_array_start(&mut self) -> Result<bool, StreamError> {
        loop {
            let Some(pos) = find(&self.buf, &self.key) else {
                // Keep a tail long enough to hold a key split across chunks.
                let keep = self.key.len() - 1;
                if self.buf.len() > keep {
                    self.consume(self.buf.len() - keep);
                }
                if !self.fill()? {
                    warn!(key = %String::from_utf8_lossy(&self.key), "key not found");
                    return Ok(false);
                }
                continue;
            };
            let after = pos + self.key.len();
            match lookahead(&self.buf[after..]) {
                Lookahead::Array(n) => {
                    self.consume(after + n);
                    debug!(offset = self.offset, "array located");
                    return Ok(true);
                }
                Lookahead::Other => {
                    trace!(offset = self.offset + pos as u64, "key does not hold an array");
                    self.consume(after);
                }
                Lookahead::Short => {
                    if !self.fill()? {
                        warn!("input ended before the array opened");
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn decode(&self) -> DecodeStep<T> {
        let mut values = Deserializer::from_slice(&self.buf).into_iter::<T>();
        match values.next() {
            None => DecodeStep::Incomplete,
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                if !self.eof && self.cut_at_end(consumed) {
                    DecodeStep::Incomplete
                } else {
                    DecodeStep::Complete { value, consumed }
                }
            }
            Some(Err(e)) if e.is_eof() => DecodeStep::Incomplete,
            Some(Err(e)) if !self.eof && error_at_end(&self.buf, &e) => DecodeStep::Incomplete,
            Some(Err(e)) => DecodeStep::Invalid(e),
        }
    }

    fn next_element(&mut self) -> Result<Option<T>, StreamError> {
        loop {
            self.skip_whitespace();
            let Some(&byte) = self.buf.first() else {
                if self.fill()? {
                    continue;
                }
                warn!(offset = self.offset, "input ended inside the array");
                return Ok(None);
            };
            match (self.state, byte) {
                (State::First | State::Separator, b']') => {
                    debug!(offset = self.offset, "array closed");
                    return Ok(None);
                }
                (State::Separator, b',') => {
                    self.consume(1);
                    self.state = State::Element;
                    continue;
                }
                (State::Separator, other) => {
                    return Err(StreamError::UnexpectedByte {
                        offset: self.offset,
                        found: if other.is_ascii() {
                            char::from(other)
                        } else {
                            char::REPLACEMENT_CHARACTER
                        },
                    });
                }
                _ => {}
            }
            match self.decode() {
                DecodeStep::Complete { value, consumed } => {
                    trace!(offset = self.offset, consumed, "element decoded");
                    self.consume(consumed);
                    self.state = State::Separator;
                    return Ok(Some(value));
                }
                DecodeStep::Incomplete => {
                    if !self.fill()? {
                        return self.decode_at_eof();
                    }
                }
                DecodeStep::Invalid(source) => {
                    return Err(StreamError::Malformed {
                        offset: self.offset,
                        source,
                    });
                }
            }
        }
    }

    /// Whether a value decoded from `consumed` bytes is a bare scalar running
    /// into the end of the buffer, so more input could still extend it.
    fn cut_at_end(&self, consumed: usize) -> bool {
        consumed == self.buf.len() && !matches!(self.buf[consumed - 1], b'}' | b']' | b'"')
    }

    /// Last attempt at the buffered element once the reader is exhausted.
    ///
    /// A value that stops short ends the sequence; bytes that could never
    /// have become JSON are malformed.
    fn decode_at_eof(&mut self) -> Result<Option<T>, StreamError> {
        match self.decode() {
            DecodeStep::Complete { value, consumed } if !self.cut_at_end(consumed) => {
                self.consume(consumed);
                self.state = State::Separator;
                return Ok(Some(value));
            }
            DecodeStep::Complete { .. } | DecodeStep::Incomplete => {}
            DecodeStep::Invalid(e) if error_at_end(&self.buf, &e) && ends_in_number(&self.buf) => {}
            DecodeStep::Invalid(source) => {
                return Err(StreamError::Malformed {
                    offset: self.offset,
                    source,
                });
            }
        }
        warn!(offset = self.offset, "input truncated mid-element");
        Ok(None)
    }

    fn finish(&mut self) {
        self.state = State::Done;
        self.buf = Vec::new();
    }
}

impl<R: Read, T: DeserializeOwned> Iterator for ArrayStream<R, T> {
    type Item = Result<T, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Locate {
            match self.locate_array_start() {
                Ok(true) => self.state = State::First,
                Ok(false) => self.finish(),
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
        if self.state == State::Done {
            return None;
        }
        match self.next_element() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl<R: Read, T: DeserializeOwned> FusedIterator for ArrayStream<R, T> {}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Whether `err` points just past the last byte of `buf`, where more input
/// could still turn it into a valid value (`1.` followed by `5`, say).
fn error_at_end(buf: &[u8], err: &serde_json::Error) -> bool {
    let line_start = buf.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
    let line = 1 + buf[..line_start].iter().filter(|&&b| b == b'\n').count();
    err.line() == line && err.column() == buf.len() - line_start
}

/// Whether `buf` stops right after a decimal point, exponent marker or sign,
/// which only a number cut short can do.
fn ends_in_number(buf: &[u8]) -> bool {
    matches!(buf.last(), Some(b'.' | b'e' | b'E' | b'+' | b'-'))
}

/// Inspect the bytes after a quoted key for `: [`.
fn lookahead(bytes: &[u8]) -> Lookahead {
    let mut rest = bytes
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, b)| !b.is_ascii_whitespace());
    match rest.next() {
        None => return Lookahead::Short,
        Some((_, b':')) => {}
        Some(_) => return Lookahead::Other,
    }
    match rest.next() {
        None => Lookahead::Short,
        Some((i, b'[')) => Lookahead::Array(i + 1),
        Some(_) => Lookahead::Other,
    }
}
