//! Per-request transport and redirect options.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hopwire::{Options, Verify};
//! use std::time::Duration;
//!
//! let options = Options::new()
//!     .timeout(Duration::from_secs(30))
//!     .redirects(5)
//!     .max_bytes(1 << 20)
//!     .verify(Verify::Bundle("/etc/ssl/ca.pem".into()));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::request::basic_auth;

/// Default `User-Agent` header value.
pub const DEFAULT_USER_AGENT: &str = concat!("hopwire/", env!("CARGO_PKG_VERSION"));

/// How the peer certificate chain is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Verify {
    /// Bundled Mozilla root store.
    #[default]
    Platform,
    /// PEM file with trusted root certificates.
    Bundle(PathBuf),
    /// Accept any certificate. Hostname checks are skipped as well.
    Off,
}

impl From<bool> for Verify {
    fn from(verify: bool) -> Self {
        if verify {
            Verify::Platform
        } else {
            Verify::Off
        }
    }
}

impl From<PathBuf> for Verify {
    fn from(path: PathBuf) -> Self {
        Verify::Bundle(path)
    }
}

/// Plain-HTTP forward proxy.
///
/// `http` targets are sent to the proxy in absolute form; `https` targets
/// go through a `CONNECT` tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub url: Url,
    pub auth: Option<(String, String)>,
}

impl Proxy {
    /// Accepts `host:port` or `http://host:port`.
    pub fn new(address: &str) -> Result<Self> {
        let address = address.trim();
        let url = if address.contains("://") {
            Url::parse(address)?
        } else {
            Url::parse(&format!("http://{}", address))?
        };
        if url.scheme() != "http" {
            return Err(Error::invalid_argument(format!(
                "Unsupported proxy scheme: {}",
                url.scheme()
            )));
        }
        if url.host().is_none() {
            return Err(Error::invalid_argument("Proxy address has no host"));
        }
        Ok(Self { url, auth: None })
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    /// `Proxy-Authorization` value, when credentials are set.
    pub fn authorization(&self) -> Option<String> {
        self.auth
            .as_ref()
            .map(|(user, pass)| basic_auth(user, pass))
    }

    /// Host and port to dial.
    pub(crate) fn address(&self) -> (String, u16) {
        let host = match self.url.host() {
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        };
        (host, self.url.port_or_known_default().unwrap_or(80))
    }
}

/// Options for a logical request.
///
/// `timeout` is a deadline covering every hop of the request, including
/// redirects. `connect_timeout` bounds each TCP connect plus TLS handshake.
#[derive(Clone, Debug)]
pub struct Options {
    /// Deadline for the whole logical request. Default: 10s.
    pub timeout: Option<Duration>,
    /// Per-connection connect + handshake timeout. Default: 10s.
    pub connect_timeout: Option<Duration>,
    /// Maximum number of redirects to follow. Default: 10.
    pub redirects: u32,
    pub follow_redirects: bool,
    /// Stop reading the body after this many bytes.
    pub max_bytes: Option<usize>,
    /// Stream the body to this file instead of memory.
    pub filename: Option<PathBuf>,
    pub verify: Verify,
    /// Check that the certificate names the requested host.
    pub verify_name: bool,
    /// When false, requests are not sent and an empty response is returned.
    pub blocking: bool,
    pub user_agent: String,
    /// Rewrite POST to GET on 301/302, as browsers do.
    pub legacy_post_redirect: bool,
    /// Basic auth credentials sent on every hop.
    pub auth: Option<(String, String)>,
    pub proxy: Option<Proxy>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            connect_timeout: Some(Duration::from_secs(10)),
            redirects: 10,
            follow_redirects: true,
            max_bytes: None,
            filename: None,
            verify: Verify::Platform,
            verify_name: true,
            blocking: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            legacy_post_redirect: true,
            auth: None,
            proxy: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert fractional seconds into a `Duration`.
    ///
    /// Negative, NaN and infinite values are rejected.
    pub fn seconds(secs: f64) -> Result<Duration> {
        Duration::try_from_secs_f64(secs)
            .map_err(|_| Error::invalid_argument(format!("invalid timeout: {} seconds", secs)))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn redirects(mut self, max: u32) -> Self {
        self.redirects = max;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = Some(max);
        self
    }

    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    pub fn verify(mut self, verify: impl Into<Verify>) -> Self {
        self.verify = verify.into();
        self
    }

    pub fn verify_name(mut self, verify_name: bool) -> Self {
        self.verify_name = verify_name;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn legacy_post_redirect(mut self, enabled: bool) -> Self {
        self.legacy_post_redirect = enabled;
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Reject option combinations that cannot be honoured.
    pub fn validate(&self) -> Result<()> {
        if self.filename.is_some() && !self.blocking {
            return Err(Error::invalid_argument(
                "filename requires a blocking request",
            ));
        }
        if let Verify::Bundle(path) = &self.verify {
            if path.as_os_str().is_empty() {
                return Err(Error::invalid_argument("empty certificate bundle path"));
            }
        }
        if self.user_agent.contains(['\r', '\n']) {
            return Err(Error::invalid_argument("user agent contains a line break"));
        }
        Ok(())
    }
}
