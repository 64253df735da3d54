//! HTTP response with explicit decompression.

use std::io::Read;

use bytes::Bytes;
use url::Url;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::version::HttpVersion;

/// Canonical reason phrase for a status code, if the code is known.
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    http::StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
}

/// Result of one physical exchange, or of a whole logical request once the
/// redirect engine has filled in `redirects`, `history`, `cookies` and `url`.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub protocol_version: HttpVersion,
    pub headers: Headers,
    /// Body as received. Empty when streamed to a file.
    pub body: Bytes,
    /// Bytes of the exchange as read from the wire.
    pub raw: Bytes,
    /// Number of redirects followed to reach this response.
    pub redirects: u32,
    /// Jar snapshot after the last hop.
    pub cookies: CookieJar,
    /// URL of the request that produced this response.
    pub url: Option<Url>,
    /// Responses of earlier hops, oldest first.
    pub history: Vec<Response>,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: Bytes, protocol_version: HttpVersion) -> Self {
        Self {
            status,
            reason: reason_phrase(status).unwrap_or_default().to_string(),
            protocol_version,
            headers,
            body,
            ..Default::default()
        }
    }

    /// Placeholder returned when the request was not sent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Override status and reason phrase.
    pub fn with_status(mut self, status: u16, reason: impl Into<String>) -> Self {
        self.status = status;
        self.reason = reason.into();
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// 2xx status.
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 300, 301, 302, 303, 307, and anything from 308 up to 399.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 300..=303 | 307..=399)
    }

    /// Turn a non-success status into an error.
    ///
    /// Redirects are accepted only when `allow_redirects` is set.
    pub fn throw_for_status(&self, allow_redirects: bool) -> Result<()> {
        if self.is_redirect() {
            if !allow_redirects {
                return Err(Error::RedirectNotAllowed { code: self.status });
            }
        } else if !self.success() {
            return Err(Error::for_status(self.status));
        }
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get_first("Location")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_first("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.headers.get_first("Content-Encoding")
    }

    /// Decode body based on Content-Encoding (gzip, deflate, br, zstd).
    pub fn decoded_body(&self) -> Result<Bytes> {
        match self
            .content_encoding()
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("gzip") | Some("x-gzip") => decode_gzip(&self.body),
            Some("deflate") => decode_deflate(&self.body),
            Some("br") => decode_brotli(&self.body),
            Some("zstd") => decode_zstd(&self.body),
            _ => {
                // Check magic bytes when Content-Encoding is missing
                if self.body.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
                    return decode_zstd(&self.body);
                }
                if self.body.starts_with(&[0x1f, 0x8b]) {
                    return decode_gzip(&self.body);
                }
                Ok(self.body.clone())
            }
        }
    }

    pub fn text(&self) -> Result<String> {
        let decoded = self.decoded_body()?;
        String::from_utf8(decoded.to_vec())
            .map_err(|e| Error::Decompression(format!("UTF-8 decode error: {}", e)))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let decoded = self.decoded_body()?;
        serde_json::from_slice(&decoded).map_err(Error::from)
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

/// zlib-wrapped first, raw deflate as fallback.
fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| Error::Decompression(format!("zstd: {}", e)))
}
