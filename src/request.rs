//! Logical requests and the physical hops they expand into.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use http::Method;
use tokio::time::Instant;
use url::Url;

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::options::Options;

/// Parse an absolute http(s) URL.
///
/// Unicode hosts are converted to their ASCII form by the URL parser.
pub fn parse_url(input: &str) -> Result<Url> {
    let url = Url::parse(input)?;
    check_url(&url)?;
    Ok(url)
}

/// Only http and https URLs with a host can be requested.
pub(crate) fn check_url(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::invalid_argument(format!(
                "unsupported URL scheme '{}'",
                other
            )))
        }
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(Error::invalid_argument(format!("URL has no host: {}", url))),
    }
}

/// Generate Basic Auth header value (RFC 7617).
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded = BASE64.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// A request as the caller sees it. May span several hops.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Bytes,
    /// Overrides the client's options when set.
    pub options: Option<Options>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self::from_url(method, parse_url(url)?))
    }

    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
            options: None,
        }
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    pub fn head(url: &str) -> Result<Self> {
        Self::new(Method::HEAD, url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::new(Method::POST, url)
    }

    pub fn put(url: &str) -> Result<Self> {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: &str) -> Result<Self> {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        for (name, values) in headers.iter() {
            for value in values {
                self.headers.append(name, value.clone());
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// URL-encode `pairs`.
    ///
    /// GET, HEAD and DELETE carry them in the query string; other methods
    /// send them as an `application/x-www-form-urlencoded` body.
    pub fn form<K, V, I>(mut self, pairs: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        if matches!(self.method, Method::GET | Method::HEAD | Method::DELETE) {
            self.url.query_pairs_mut().extend_pairs(pairs);
        } else {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            self.headers
                .insert_default("Content-Type", "application/x-www-form-urlencoded");
            self.body = Bytes::from(encoded);
        }
        self
    }

    /// Serialize `value` as a JSON body.
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers.insert_default("Content-Type", "application/json");
        Ok(self)
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }
}

/// One wire-level exchange. A new one is built for every redirect hop.
#[derive(Debug, Clone)]
pub struct PhysicalRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Bytes,
    pub options: Options,
    /// Shared by all hops of the logical request.
    pub deadline: Option<Instant>,
}

impl PhysicalRequest {
    pub fn new(method: Method, url: Url, headers: Headers, body: Bytes, options: Options) -> Self {
        Self {
            method,
            url,
            headers,
            body,
            options,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Host and port as they appear in the `Host` header.
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// `origin-form` request target: path plus query.
    pub fn target(&self) -> &str {
        &self.url[url::Position::BeforePath..url::Position::AfterQuery]
    }

    /// `absolute-form` target used when talking to a forward proxy.
    pub fn absolute_target(&self) -> &str {
        &self.url[..url::Position::AfterQuery]
    }

    /// Whether this hop is written to a proxy rather than tunnelled.
    pub fn via_proxy(&self) -> bool {
        self.options.proxy.is_some() && self.url.scheme() == "http"
    }
}
