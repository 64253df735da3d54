//! HTTP/1.x wire exchange over a single connection.
//!
//! Uses raw I/O for request formatting (Host first, caller header order
//! preserved) and reads the response with framing awareness, so the
//! exchange ends as soon as the body is complete even if the peer keeps
//! the connection open.

use bytes::{Bytes, BytesMut};
use http::Method;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::chunked::ChunkedDecoder;
use crate::error::{Error, Result};
use crate::headers::is_tchar;
use crate::hooks::Hooks;
use crate::parser::{body_framing, parse_head, BodyFraming, MAX_HEADERS_SIZE};
use crate::request::PhysicalRequest;
use crate::transport::connector::MaybeHttpsStream;

const READ_BUF_SIZE: usize = 8192;

/// One request/response exchange on an open stream.
pub struct H1Connection {
    stream: MaybeHttpsStream,
}

impl H1Connection {
    pub fn new(stream: MaybeHttpsStream) -> Self {
        Self { stream }
    }

    /// Write the request and read the raw response bytes.
    ///
    /// When the request streams to a file, the returned bytes hold only
    /// the response head(s).
    pub async fn exchange(&mut self, request: &PhysicalRequest, hooks: &dyn Hooks) -> Result<Bytes> {
        let head = build_request(request)?;
        self.stream
            .write_all(&head)
            .await
            .map_err(|e| Error::connection(format!("Failed to write request: {}", e)))?;

        if !request.body.is_empty() {
            self.stream
                .write_all(&request.body)
                .await
                .map_err(|e| Error::connection(format!("Failed to write body: {}", e)))?;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::connection(format!("Failed to flush: {}", e)))?;

        tracing::trace!(
            method = %request.method,
            url = %request.url,
            body_len = request.body.len(),
            "request written"
        );

        self.read_response(request, hooks).await
    }

    async fn read_more(&mut self, buffer: &mut BytesMut) -> Result<usize> {
        let mut read_buf = [0u8; READ_BUF_SIZE];
        let n = self
            .stream
            .read(&mut read_buf)
            .await
            .map_err(|e| Error::connection(format!("Failed to read response: {}", e)))?;
        buffer.extend_from_slice(&read_buf[..n]);
        Ok(n)
    }

    /// Read heads until the final (non-1xx) one, then the body.
    async fn read_response(&mut self, request: &PhysicalRequest, hooks: &dyn Hooks) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(READ_BUF_SIZE);
        let mut offset = 0;

        let head = loop {
            if let Some(head) = parse_head(&buffer[offset..])? {
                if head.is_informational() {
                    // Per RFC 9112 Section 6: skip 1xx, the final response follows
                    offset += head.len;
                    continue;
                }
                break head;
            }

            if buffer.len() - offset >= MAX_HEADERS_SIZE {
                return Err(Error::parse("Response headers too large"));
            }

            if self.read_more(&mut buffer).await? == 0 {
                if buffer.is_empty() {
                    return Err(Error::connection(
                        "Connection closed before response was received",
                    ));
                }
                // Incomplete head; the parser reports it.
                return Ok(buffer.freeze());
            }
        };

        let framing = body_framing(head.status, &request.method, &head.headers)?;
        let body_start = offset + head.len;
        let initial = buffer.split_off(body_start);

        tracing::debug!(status = head.status, ?framing, "response head received");

        let body = self.read_body(initial, framing, request, hooks).await?;
        buffer.extend_from_slice(&body);
        Ok(buffer.freeze())
    }

    /// Read the body per `framing`, honouring `max_bytes` and the file sink.
    ///
    /// Returns the bytes that belong in the in-memory response.
    async fn read_body(
        &mut self,
        mut pending: BytesMut,
        framing: BodyFraming,
        request: &PhysicalRequest,
        hooks: &dyn Hooks,
    ) -> Result<BytesMut> {
        if framing == BodyFraming::Empty {
            return Ok(BytesMut::new());
        }

        let mut limit = request.options.max_bytes.unwrap_or(usize::MAX);
        if let BodyFraming::Length(len) = framing {
            limit = limit.min(len);
        }

        let mut decoder = (framing == BodyFraming::Chunked).then(ChunkedDecoder::new);
        let mut file = match &request.options.filename {
            Some(path) => Some(File::create(path).await?),
            None => None,
        };

        let mut body = BytesMut::new();
        let mut received = 0usize;

        loop {
            let take = pending.len().min(limit - received);
            let chunk = pending.split_to(take);
            pending.clear();
            received += take;

            if !chunk.is_empty() {
                if let Some(decoder) = decoder.as_mut() {
                    decoder.feed(&chunk);
                }
                match (&mut file, &decoder) {
                    (Some(file), None) => file.write_all(&chunk).await?,
                    _ => body.extend_from_slice(&chunk),
                }
                hooks.on_progress(&request.url, received);
            }

            let complete = match framing {
                BodyFraming::Length(len) => received >= len,
                BodyFraming::Chunked => decoder.as_ref().is_some_and(|d| d.is_finished()),
                _ => false,
            };
            if complete {
                break;
            }
            if received >= limit {
                tracing::debug!(received, "max_bytes reached; truncating body");
                break;
            }

            if self.read_more(&mut pending).await? == 0 {
                // Below `limit`, so the announced length was not reached
                if let BodyFraming::Length(len) = framing {
                    return Err(Error::connection(format!(
                        "Connection closed before receiving full body (got {} of {} bytes)",
                        received, len
                    )));
                }
                break;
            }
        }

        if let Some(mut file) = file {
            if let Some(decoder) = decoder {
                file.write_all(&decoder.finish()).await?;
                body.clear();
            }
            file.flush().await?;
        }

        Ok(body)
    }
}

/// Serialize the request line and headers.
///
/// `Host` always comes first. `Connection: close` and `Content-Length`
/// are added when the caller did not set them.
pub(crate) fn build_request(request: &PhysicalRequest) -> Result<Vec<u8>> {
    for (name, value) in request.headers.flatten() {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut out = Vec::with_capacity(1024);

    // Request line: METHOD request-target HTTP/1.1\r\n
    out.extend_from_slice(request.method.as_str().as_bytes());
    out.push(b' ');
    let target = if request.via_proxy() {
        request.absolute_target()
    } else {
        request.target()
    };
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    let host = match request.headers.get_first("Host") {
        Some(host) => host.to_string(),
        None => request.host_header(),
    };
    out.extend_from_slice(b"Host: ");
    out.extend_from_slice(host.as_bytes());
    out.extend_from_slice(b"\r\n");

    for (name, value) in request.headers.flatten() {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    if request.via_proxy() && !request.headers.contains("Proxy-Authorization") {
        let auth = request.options.proxy.as_ref().and_then(|proxy| proxy.authorization());
        if let Some(auth) = auth {
            out.extend_from_slice(b"Proxy-Authorization: ");
            out.extend_from_slice(auth.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }

    if !request.headers.contains("Connection") {
        out.extend_from_slice(b"Connection: close\r\n");
    }

    // MUST NOT send Content-Length alongside Transfer-Encoding
    let needs_length = !request.body.is_empty()
        || matches!(request.method, Method::POST | Method::PUT | Method::PATCH);
    if needs_length
        && !request.headers.contains("Content-Length")
        && !request.headers.contains("Transfer-Encoding")
    {
        out.extend_from_slice(b"Content-Length: ");
        out.extend_from_slice(request.body.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"\r\n");
    Ok(out)
}

/// Validate a header name per RFC 9110 Section 5.1.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("Empty header name"));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::invalid_argument(format!(
            "Invalid character in header name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Header values must not contain NUL, CR, or LF (prevents header injection).
fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::invalid_argument(
            "Invalid character in header value (CR/LF/NUL not allowed)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use crate::options::Options;
    use url::Url;

    fn physical(method: Method, url: &str, headers: Headers, body: &'static [u8]) -> PhysicalRequest {
        PhysicalRequest::new(
            method,
            Url::parse(url).unwrap(),
            headers,
            Bytes::from_static(body),
            Options::default(),
        )
    }

    #[test]
    fn test_build_request_host_first() {
        let headers: Headers = [("Accept", "*/*"), ("host", "override.example")].into_iter().collect();
        let req = physical(Method::GET, "http://example.com:8080/path?q=1", headers, b"");
        let raw = String::from_utf8(build_request(&req).unwrap()).unwrap();
        assert_eq!(
            raw,
            "GET /path?q=1 HTTP/1.1\r\nHost: override.example\r\nAccept: */*\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_build_request_content_length() {
        let req = physical(Method::POST, "http://example.com/", Headers::new(), b"abc");
        let raw = String::from_utf8(build_request(&req).unwrap()).unwrap();
        assert!(raw.starts_with("POST / HTTP/1.1\r\nHost: example.com\r\n"));
        assert!(raw.contains("Content-Length: 3\r\n"));

        let empty_post = physical(Method::POST, "http://example.com/", Headers::new(), b"");
        let raw = String::from_utf8(build_request(&empty_post).unwrap()).unwrap();
        assert!(raw.contains("Content-Length: 0\r\n"));

        let get = physical(Method::GET, "http://example.com/", Headers::new(), b"");
        let raw = String::from_utf8(build_request(&get).unwrap()).unwrap();
        assert!(!raw.contains("Content-Length"));
    }

    #[test]
    fn test_build_request_through_proxy() {
        let proxy = crate::options::Proxy::new("127.0.0.1:3128").unwrap().with_auth("user", "pass");
        let req = PhysicalRequest::new(
            Method::GET,
            Url::parse("http://example.com/path?q=1").unwrap(),
            Headers::new(),
            Bytes::new(),
            Options::default().proxy(proxy),
        );
        let raw = String::from_utf8(build_request(&req).unwrap()).unwrap();
        assert_eq!(
            raw,
            "GET http://example.com/path?q=1 HTTP/1.1\r\nHost: example.com\r\n\
             Proxy-Authorization: Basic dXNlcjpwYXNz\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_build_request_rejects_injection() {
        let headers: Headers = [("X-Evil", "a\r\nInjected: yes")].into_iter().collect();
        let req = physical(Method::GET, "http://example.com/", headers, b"");
        assert!(build_request(&req).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_validate_header_name() {
        assert!(validate_header_name("Content-Type").is_ok());
        assert!(validate_header_name("X!#$%&'*+.^_`|~").is_ok());
        assert!(validate_header_name("").is_err());
        assert!(validate_header_name("Content Type").is_err());
        assert!(validate_header_name("Content:Type").is_err());
        assert!(validate_header_name("Content(Type)").is_err());
    }

    #[test]
    fn test_validate_header_value() {
        assert!(validate_header_value("application/json; charset=utf-8").is_ok());
        assert!(validate_header_value("").is_ok());
        assert!(validate_header_value("value\twith\ttabs").is_ok());
        assert!(validate_header_value("value\rmore").is_err());
        assert!(validate_header_value("value\nmore").is_err());
        assert!(validate_header_value("value\x00more").is_err());
    }
}
