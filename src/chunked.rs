//! Chunked transfer-coding decoder (RFC 9112 Section 7.1).
//!
//! The decoder is fed incrementally while a response is read off the wire,
//! so the reader knows when the last chunk arrived. Input that stops looking
//! like chunked framing is handed back untouched: servers that announce
//! `Transfer-Encoding: chunked` and then send a plain body still produce a
//! usable response.

use bytes::{Bytes, BytesMut};

use crate::headers::is_tchar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a `chunk-size [ chunk-ext ] CRLF` line.
    Size,
    /// Inside chunk data.
    Data { remaining: usize },
    /// Expecting the CRLF that closes a chunk.
    DataEnd,
    /// Saw the last chunk. Trailers are ignored.
    Done,
    /// Framing violated; the original bytes are the body.
    Invalid,
}

/// Incremental chunked body decoder.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
    pending: BytesMut,
    decoded: BytesMut,
    original: BytesMut,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Size,
            pending: BytesMut::new(),
            decoded: BytesMut::new(),
            original: BytesMut::new(),
        }
    }

    /// Feed more body bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.original.extend_from_slice(data);
        if matches!(self.state, State::Done | State::Invalid) {
            return;
        }
        self.pending.extend_from_slice(data);
        self.advance();
    }

    /// The terminating zero-size chunk has been seen.
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// The input is known not to be chunked.
    pub fn is_invalid(&self) -> bool {
        self.state == State::Invalid
    }

    /// Decoded bytes so far.
    pub fn decoded_len(&self) -> usize {
        self.decoded.len()
    }

    /// Complete decoding at end of input.
    ///
    /// A truncated final chunk, a missing closing CRLF, or a last chunk
    /// without its CRLF are tolerated. Anything else yields the original bytes.
    pub fn finish(self) -> Bytes {
        let accept = match self.state {
            State::Done | State::Data { .. } => true,
            State::DataEnd => self.pending.is_empty() || &self.pending[..] == b"\r",
            State::Size => {
                let line = self.pending.strip_suffix(b"\r").unwrap_or(&self.pending);
                line.iter().all(u8::is_ascii_whitespace)
                    || (parse_size_line(line) == Some(0) && !self.decoded.is_empty())
            }
            State::Invalid => false,
        };

        if accept {
            self.decoded.freeze()
        } else {
            self.original.freeze()
        }
    }

    fn advance(&mut self) {
        loop {
            match self.state {
                State::Size => {
                    let Some(pos) = find_crlf(&self.pending) else {
                        return;
                    };
                    let line = self.pending.split_to(pos + 2);
                    self.state = match parse_size_line(&line[..pos]) {
                        Some(0) => State::Done,
                        Some(size) => State::Data { remaining: size },
                        None => State::Invalid,
                    };
                }
                State::Data { remaining } => {
                    if self.pending.is_empty() {
                        return;
                    }
                    let take = remaining.min(self.pending.len());
                    let chunk = self.pending.split_to(take);
                    self.decoded.extend_from_slice(&chunk);
                    self.state = if take == remaining {
                        State::DataEnd
                    } else {
                        State::Data {
                            remaining: remaining - take,
                        }
                    };
                }
                State::DataEnd => {
                    if self.pending.len() < 2 {
                        if self.pending.first().is_some_and(|b| *b != b'\r') {
                            self.state = State::Invalid;
                        }
                        return;
                    }
                    if &self.pending[..2] != b"\r\n" {
                        self.state = State::Invalid;
                        return;
                    }
                    let _ = self.pending.split_to(2);
                    self.state = State::Size;
                }
                State::Done | State::Invalid => {
                    self.pending.clear();
                    return;
                }
            }
        }
    }
}

/// Decode a complete chunked body in one go.
pub fn decode_chunked(data: &[u8]) -> Bytes {
    let mut decoder = ChunkedDecoder::new();
    decoder.feed(data);
    decoder.finish()
}

/// Parse `chunk-size [ BWS chunk-ext ]` without the trailing CRLF.
fn parse_size_line(line: &[u8]) -> Option<usize> {
    let digits = line.iter().take_while(|b| b.is_ascii_hexdigit()).count();
    if digits == 0 {
        return None;
    }
    let size = std::str::from_utf8(&line[..digits])
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())?;

    valid_chunk_extensions(&line[digits..]).then_some(size)
}

/// chunk-ext = *( BWS ";" BWS chunk-ext-name [ BWS "=" BWS chunk-ext-val ] )
fn valid_chunk_extensions(mut rest: &[u8]) -> bool {
    fn skip_bws(s: &[u8]) -> &[u8] {
        let n = s.iter().take_while(|b| matches!(b, b' ' | b'\t')).count();
        &s[n..]
    }
    fn skip_token(s: &[u8]) -> Option<&[u8]> {
        let n = s.iter().take_while(|b| is_tchar(**b)).count();
        (n > 0).then(|| &s[n..])
    }

    loop {
        rest = skip_bws(rest);
        let Some((&first, tail)) = rest.split_first() else {
            return true;
        };
        if first != b';' {
            return false;
        }

        rest = match skip_token(skip_bws(tail)) {
            Some(r) => skip_bws(r),
            None => return false,
        };

        if let Some(value) = rest.strip_prefix(b"=") {
            let value = skip_bws(value);
            rest = match value.strip_prefix(b"\"") {
                Some(quoted) => match skip_quoted(quoted) {
                    Some(r) => r,
                    None => return false,
                },
                None => match skip_token(value) {
                    Some(r) => r,
                    None => return false,
                },
            };
        }
    }
}

/// Skip a quoted-string body after its opening quote.
fn skip_quoted(s: &[u8]) -> Option<&[u8]> {
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            b'"' => return Some(&s[i + 1..]),
            b'\\' => i += 2,
            b'\r' | b'\n' => return None,
            _ => i += 1,
        }
    }
    None
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}
