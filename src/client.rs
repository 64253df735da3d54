//! Request executor: redirect handling, cookie persistence and batches.
//!
//! One logical request becomes a chain of physical hops. After every hop
//! the `Set-Cookie` headers are merged into the jar, and if the response
//! is a followable redirect the next hop is built from the `Location`
//! header with the method rewritten per status code:
//!
//! - 301/302: POST becomes GET (unless `legacy_post_redirect` is off)
//! - 303: GET with an empty body, except HEAD stays HEAD
//! - 307/308: method and body preserved
//!
//! The request timeout is a single deadline for the whole chain.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::time::Instant;
use url::Url;

use crate::cookie::{Cookie, CookieJar};
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::hooks::{self, Hooks};
use crate::options::Options;
use crate::parser::parse_response;
use crate::request::{basic_auth, check_url, parse_url, PhysicalRequest, Request};
use crate::response::Response;
use crate::transport::{MultiTransport, SocketTransport, Transport};

/// HTTP client executing logical requests over a transport.
pub struct Client<T = SocketTransport> {
    transport: Arc<T>,
    options: Options,
    default_headers: Headers,
    cookies: CookieJar,
    hooks: Arc<dyn Hooks>,
    max_concurrency: Option<usize>,
    batch_ceiling: Option<Duration>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            options: self.options.clone(),
            default_headers: self.default_headers.clone(),
            cookies: self.cookies.clone(),
            hooks: self.hooks.clone(),
            max_concurrency: self.max_concurrency,
            batch_ceiling: self.batch_ceiling,
        }
    }
}

/// Builder for creating clients.
pub struct ClientBuilder {
    options: Options,
    default_headers: Headers,
    cookies: CookieJar,
    hooks: Option<Arc<dyn Hooks>>,
    max_concurrency: Option<usize>,
    batch_ceiling: Option<Duration>,
}

/// Builder for a single request.
pub struct RequestBuilder<'a, T> {
    client: &'a Client<T>,
    request: Result<Request>,
}

impl Client<SocketTransport> {
    /// Client with default options over a `SocketTransport`.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(SocketTransport::new()),
            options: Options::default(),
            default_headers: Headers::new(),
            cookies: CookieJar::new(),
            hooks: hooks::none(),
            max_concurrency: None,
            batch_ceiling: None,
        }
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl Default for Client<SocketTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport + 'static> Client<T> {
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Create a GET request builder.
    pub fn get(&self, url: &str) -> RequestBuilder<'_, T> {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: &str) -> RequestBuilder<'_, T> {
        self.request(Method::POST, url)
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: &str) -> RequestBuilder<'_, T> {
        self.request(Method::HEAD, url)
    }

    /// Create a custom method request builder.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder<'_, T> {
        RequestBuilder {
            client: self,
            request: Request::new(method, url),
        }
    }

    /// Execute a logical request with a copy of the client's cookie jar.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut jar = self.cookies.clone();
        self.execute_with_jar(request, &mut jar).await
    }

    /// Execute a logical request, reading and updating `jar` along the way.
    pub async fn execute_with_jar(&self, request: Request, jar: &mut CookieJar) -> Result<Response> {
        let Request {
            method,
            url,
            headers,
            body,
            options,
        } = request;
        let options = options.unwrap_or_else(|| self.options.clone());
        options.validate()?;
        check_url(&url)?;

        if !options.blocking {
            tracing::debug!(%url, "non-blocking request; not sending");
            return Ok(Response::empty());
        }

        let mut headers = headers;
        for (name, values) in self.default_headers.iter() {
            if !headers.contains(name) {
                for value in values {
                    headers.append(name, value.clone());
                }
            }
        }

        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        let mut hop = Hop {
            method,
            url,
            headers,
            body,
        };
        let mut history = Vec::new();
        let mut redirects = 0u32;

        loop {
            let physical = self.prepare(&hop, &options, jar, deadline);
            let raw = self.transport.send(&physical).await?;
            let mut response = parse_response(raw, &hop.method)?;
            response.url = Some(hop.url.clone());

            jar.merge(Cookie::parse_from_headers(
                &response.headers,
                Some(&hop.url),
                None,
            ));

            let next_url = if options.follow_redirects {
                redirect_target(&response, &hop.url)?
            } else {
                None
            };
            let Some(next_url) = next_url else {
                response.redirects = redirects;
                response.history = history;
                response.cookies = jar.clone();
                self.hooks.on_complete(&response);
                return Ok(response);
            };

            if redirects >= options.redirects {
                tracing::debug!(limit = options.redirects, "redirect limit exceeded");
                return Err(Error::TooManyRedirects {
                    count: redirects + 1,
                });
            }
            redirects += 1;

            tracing::debug!(
                status = response.status,
                from = %hop.url,
                to = %next_url,
                hop = redirects,
                "following redirect"
            );
            self.hooks.on_redirect(&hop.url, &next_url, response.status);

            hop.redirect(response.status, next_url, options.legacy_post_redirect);
            history.push(response);
        }
    }

    /// Build the physical request for one hop.
    fn prepare(
        &self,
        hop: &Hop,
        options: &Options,
        jar: &CookieJar,
        deadline: Option<Instant>,
    ) -> PhysicalRequest {
        let mut headers = hop.headers.clone();

        if let Some(cookie) = jar.build_cookie_header(&hop.url) {
            headers.insert("Cookie", cookie);
        }
        if let Some((username, password)) = &options.auth {
            headers.insert_default("Authorization", basic_auth(username, password));
        }
        headers.insert_default("User-Agent", options.user_agent.clone());

        let physical = PhysicalRequest::new(
            hop.method.clone(),
            hop.url.clone(),
            headers,
            hop.body.clone(),
            options.clone(),
        );
        match deadline {
            Some(deadline) => physical.with_deadline(deadline),
            None => physical,
        }
    }

    /// Execute many logical requests concurrently.
    ///
    /// Every request runs its own redirect chain with its own copy of the
    /// client's jar. Failures stay with their key; `on_complete` fires once
    /// per key in completion order.
    pub async fn request_multiple<K, F>(
        &self,
        requests: impl IntoIterator<Item = (K, Request)>,
        on_complete: F,
    ) -> HashMap<K, Result<Response>>
    where
        K: Eq + Hash + Clone + Send + 'static,
        F: FnMut(&K, &Result<Response>),
    {
        let mut multi = MultiTransport::from_arc(self.transport.clone());
        if let Some(limit) = self.max_concurrency {
            multi = multi.max_concurrency(limit);
        }
        if let Some(ceiling) = self.batch_ceiling {
            multi = multi.ceiling(ceiling);
        }

        let jobs = requests.into_iter().map(|(key, request)| {
            let client = self.clone();
            (key, async move { client.execute(request).await })
        });
        multi.drive(jobs, on_complete).await
    }
}

/// Mutable state of the current hop.
struct Hop {
    method: Method,
    url: Url,
    headers: Headers,
    body: Bytes,
}

impl Hop {
    /// Rewrite method/body for the next hop after a redirect `status`.
    fn redirect(&mut self, status: u16, next_url: Url, legacy_post_redirect: bool) {
        let to_get = match status {
            301 | 302 => self.method == Method::POST && legacy_post_redirect,
            303 => self.method != Method::HEAD,
            _ => false,
        };

        if to_get {
            self.method = Method::GET;
            self.body = Bytes::new();
            for name in ["Content-Length", "Content-Type", "Transfer-Encoding"] {
                self.headers.remove(name);
            }
        }

        if next_url.host_str() != self.url.host_str() || next_url.port() != self.url.port() {
            self.headers.remove("Host");
        }
        self.url = next_url;
    }
}

/// Where a response redirects to, if it is a followable redirect.
fn redirect_target(response: &Response, current: &Url) -> Result<Option<Url>> {
    if !matches!(response.status, 301 | 302 | 303 | 307 | 308) {
        return Ok(None);
    }
    let Some(location) = response.location() else {
        return Ok(None);
    };

    let next = current.join(location.trim())?;
    check_url(&next)?;
    Ok(Some(next))
}

impl<'a, T: Transport + 'static> RequestBuilder<'a, T> {
    /// Add a header to the request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.map(|r| r.header(key, value));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request = self.request.map(|r| r.body(body));
        self
    }

    /// URL-encoded form data (query string for GET/HEAD/DELETE).
    pub fn form<K, V, I>(mut self, pairs: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.request = self.request.map(|r| r.form(pairs));
        self
    }

    /// JSON body.
    pub fn json<B: serde::Serialize + ?Sized>(mut self, value: &B) -> Self {
        self.request = self.request.and_then(|r| r.json(value));
        self
    }

    /// Override the client's options for this request.
    pub fn options(mut self, options: Options) -> Self {
        self.request = self.request.map(|r| r.options(options));
        self
    }

    /// Build the request without sending it.
    pub fn build(self) -> Result<Request> {
        self.request
    }

    /// Send the request and return the response.
    pub async fn send(self) -> Result<Response> {
        let request = self.request?;
        self.client.execute(request).await
    }

    /// Send the request using (and updating) `jar`.
    pub async fn send_with_jar(self, jar: &mut CookieJar) -> Result<Response> {
        let request = self.request?;
        self.client.execute_with_jar(request, jar).await
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            default_headers: Headers::new(),
            cookies: CookieJar::new(),
            hooks: None,
            max_concurrency: None,
            batch_ceiling: None,
        }
    }

    /// Replace the default options.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Set the whole-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    /// Header sent with every request unless the request sets it.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.append(name, value);
        self
    }

    /// Cookies every request starts with.
    pub fn cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookies = jar;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Maximum in-flight requests for `request_multiple`.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Overall time limit for `request_multiple`.
    pub fn batch_ceiling(mut self, ceiling: Duration) -> Self {
        self.batch_ceiling = Some(ceiling);
        self
    }

    /// Build a client over a `SocketTransport`.
    pub fn build(self) -> Result<Client<SocketTransport>> {
        let transport = match &self.hooks {
            Some(hooks) => SocketTransport::with_hooks(hooks.clone()),
            None => SocketTransport::new(),
        };
        self.build_with_transport(transport)
    }

    /// Build a client over a custom transport.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<Client<T>> {
        self.options.validate()?;
        for (name, _) in self.default_headers.iter() {
            if name.is_empty() {
                return Err(Error::invalid_argument("empty default header name"));
            }
        }

        Ok(Client {
            transport: Arc::new(transport),
            options: self.options,
            default_headers: self.default_headers,
            cookies: self.cookies,
            hooks: self.hooks.unwrap_or_else(hooks::none),
            max_concurrency: self.max_concurrency,
            batch_ceiling: self.batch_ceiling,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience: GET `url` with default options.
pub async fn get(url: &str) -> Result<Response> {
    let request = Request::from_url(Method::GET, parse_url(url)?);
    Client::new().execute(request).await
}
