//! # Hopwire
//!
//! HTTP/1.x client engine.
//!
//! Hopwire turns a logical request into one or more wire exchanges:
//! redirects are followed with per-status method rewriting, cookies are
//! carried across hops, chunked and compressed bodies are decoded, and
//! TLS peers are checked against the requested host name.
//!
//! ```rust,ignore
//! use hopwire::{Client, Options};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .options(Options::new().timeout(Duration::from_secs(5)).redirects(3))
//!     .build()?;
//! let response = client.get("https://example.com/").send().await?;
//! println!("{} {}", response.status, response.text()?);
//! ```

pub mod chunked;
pub mod client;
pub mod cookie;
pub mod error;
pub mod headers;
pub mod hooks;
pub mod options;
pub mod parser;
pub mod request;
pub mod response;
pub mod ssl;
pub mod transport;
pub mod version;

// Re-exports
pub use chunked::decode_chunked;
pub use client::{get, Client, ClientBuilder, RequestBuilder};
pub use cookie::{AttributeValue, Cookie, CookieFlags, CookieJar};
pub use error::{Error, Result};
pub use headers::Headers;
pub use hooks::{Hooks, NoHooks};
pub use options::{Options, Proxy, Verify, DEFAULT_USER_AGENT};
pub use parser::parse_response;
pub use request::{parse_url, PhysicalRequest, Request};
pub use response::Response;
pub use ssl::Certificate;
pub use transport::{MultiTransport, SocketTransport, Transport};
pub use version::HttpVersion;
