//! HTTP protocol version.

use std::fmt;

/// Protocol version spoken on the wire. Only HTTP/1.0 and HTTP/1.1 are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    /// HTTP/1.0.
    Http1_0,
    /// HTTP/1.1.
    #[default]
    Http1_1,
}

impl HttpVersion {
    /// Version number without the `HTTP/` prefix, e.g. `"1.1"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http1_0 => "1.0",
            Self::Http1_1 => "1.1",
        }
    }

    /// Version as it appears in a request or status line.
    pub fn as_protocol(&self) -> &'static str {
        match self {
            Self::Http1_0 => "HTTP/1.0",
            Self::Http1_1 => "HTTP/1.1",
        }
    }

    /// Map the minor version reported by the status-line parser.
    pub fn from_minor(minor: u8) -> Option<Self> {
        match minor {
            0 => Some(Self::Http1_0),
            1 => Some(Self::Http1_1),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
