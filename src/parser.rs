//! HTTP/1.x response parsing.
//!
//! Uses httparse for the status line and header block. Folded header lines
//! are joined with a single space and repeated names are merged. The body
//! is framed per RFC 9112 Section 6.3.

use bytes::Bytes;
use http::Method;

use crate::chunked::ChunkedDecoder;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::response::Response;
use crate::version::HttpVersion;

/// Maximum response header size (64KB).
pub(crate) const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 128;

/// Parsed status line and header block of one response.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub version: HttpVersion,
    pub headers: Headers,
    /// Bytes consumed, including the blank separator line.
    pub len: usize,
}

impl ResponseHead {
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }
}

/// How the body of a response is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    /// No body, whatever the headers say.
    Empty,
    Chunked,
    Length(usize),
    /// Delimited by connection close.
    Close,
}

/// Parse a response head from the start of `buf`.
///
/// Returns `Ok(None)` while the header block is incomplete.
pub(crate) fn parse_head(buf: &[u8]) -> Result<Option<ResponseHead>> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut raw_headers);

    let status = httparse::ParserConfig::default()
        .allow_obsolete_multiline_headers_in_responses(true)
        .allow_spaces_after_header_name_in_responses(true)
        .allow_multiple_spaces_in_response_status_delimiters(true)
        .parse_response(&mut response, buf)
        .map_err(|e| Error::parse(format!("Failed to parse response: {}", e)))?;

    let len = match status {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let version = response
        .version
        .and_then(HttpVersion::from_minor)
        .ok_or_else(|| Error::parse("Unsupported HTTP version"))?;
    let status = response
        .code
        .ok_or_else(|| Error::parse("Missing status code"))?;
    let reason = response.reason.unwrap_or_default().to_string();

    let mut headers = Headers::new();
    for header in response.headers.iter().filter(|h| !h.name.is_empty()) {
        headers.append(header.name, unfold(header.value));
    }

    Ok(Some(ResponseHead {
        status,
        reason,
        version,
        headers,
        len,
    }))
}

/// Join obsolete line folding into a single space.
fn unfold(value: &[u8]) -> String {
    let value = String::from_utf8_lossy(value);
    if !value.contains(['\r', '\n']) {
        return value.into_owned();
    }

    let mut out = String::with_capacity(value.len());
    let mut folding = false;
    for c in value.chars() {
        match c {
            '\r' | '\n' => folding = true,
            ' ' | '\t' if folding => {}
            _ => {
                if folding {
                    out.push(' ');
                    folding = false;
                }
                out.push(c);
            }
        }
    }
    out
}

/// Determine body framing per RFC 9112 Section 6.3.
pub(crate) fn body_framing(status: u16, method: &Method, headers: &Headers) -> Result<BodyFraming> {
    // A response to HEAD MUST NOT contain a body.
    // 1xx, 204, and 304 responses MUST NOT contain a body.
    if *method == Method::HEAD || matches!(status, 100..=199 | 204 | 304) {
        return Ok(BodyFraming::Empty);
    }

    // Transfer-Encoding overrides Content-Length
    if let Some(te) = headers.get("transfer-encoding") {
        let chunked = te
            .split(',')
            .next_back()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("chunked"));
        return Ok(if chunked {
            BodyFraming::Chunked
        } else {
            BodyFraming::Close
        });
    }

    match headers.get("content-length") {
        Some(value) => parse_content_length(&value).map(BodyFraming::Length),
        None => Ok(BodyFraming::Close),
    }
}

/// Parse and validate Content-Length header value per RFC 9112 Section 6.2.
///
/// If multiple values are present (comma-separated), they must all be identical.
pub(crate) fn parse_content_length(value: &str) -> Result<usize> {
    let mut parts = value.split(',').map(str::trim);

    let parse = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| Error::parse(format!("Invalid Content-Length: {}", value)))
    };

    let first = parse(parts.next().unwrap_or_default())?;
    for part in parts {
        if parse(part)? != first {
            return Err(Error::parse(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }

    Ok(first)
}

/// Parse the bytes of one physical exchange into a `Response`.
///
/// Interim 1xx responses are skipped. A body cut short (by `max_bytes` or
/// a file sink that already consumed it) yields whatever bytes are present.
pub fn parse_response(raw: Bytes, method: &Method) -> Result<Response> {
    let mut offset = 0;

    let head = loop {
        let head = parse_head(&raw[offset..])?
            .ok_or_else(|| Error::parse("Missing header/body separator"))?;
        offset += head.len;
        if !head.is_informational() {
            break head;
        }
        tracing::trace!(status = head.status, "skipping interim response");
    };

    let rest = raw.slice(offset..);
    let body = match body_framing(head.status, method, &head.headers)? {
        BodyFraming::Empty => Bytes::new(),
        BodyFraming::Length(len) => rest.slice(..len.min(rest.len())),
        BodyFraming::Close => rest,
        BodyFraming::Chunked => {
            let mut decoder = ChunkedDecoder::new();
            decoder.feed(&rest);
            if decoder.is_invalid() {
                tracing::debug!("response claims chunked encoding but is not; using raw body");
            }
            decoder.finish()
        }
    };

    tracing::debug!(
        status = head.status,
        version = %head.version,
        body_len = body.len(),
        "parsed response"
    );

    let mut response = Response::new(head.status, head.headers, body, head.version);
    if response.reason.is_empty() {
        response.reason = head.reason;
    }
    response.raw = raw;
    Ok(response)
}
