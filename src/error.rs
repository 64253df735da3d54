//! Error types for hopwire.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while executing HTTP requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DNS resolution, TCP connect, or connection reset.
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Malformed status line, header block, or missing header/body separator.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Deadline for the logical request (or batch ceiling) exceeded.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Redirect limit exceeded.
    #[error("Too many redirects ({count} redirects)")]
    TooManyRedirects { count: u32 },

    /// The server certificate does not name the requested host.
    #[error("Certificate does not match host '{host}'")]
    CertificateMismatch { host: String },

    /// Terminal status code converted by `throw_for_status`.
    #[error("HTTP {code}: {reason}")]
    HttpStatus { code: u16, reason: String },

    /// `throw_for_status` on a code outside the known table.
    #[error("HTTP {code}: Unknown Status")]
    UnknownStatus { code: u16 },

    /// A redirect response passed to `throw_for_status(false)`.
    #[error("Redirection not allowed (HTTP {code})")]
    RedirectNotAllowed { code: u16 },

    /// Bad option or parameter, detected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Decompression error.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (file sinks, certificate bundles).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Build the error for a terminal status code.
    ///
    /// 3xx-5xx codes with a canonical reason phrase map to `HttpStatus`,
    /// anything else (1xx included) to `UnknownStatus`.
    pub fn for_status(code: u16) -> Self {
        let reason = match code {
            300..=599 => crate::response::reason_phrase(code),
            _ => None,
        };
        match reason {
            Some(reason) => Self::HttpStatus {
                code,
                reason: reason.to_string(),
            },
            None => Self::UnknownStatus { code },
        }
    }

    /// True for failures to reach or talk to the peer (including TLS).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_))
    }

    /// True if the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True for errors raised before any I/O took place.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::UrlParse(_))
    }

    /// The status code carried by status errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code, .. }
            | Self::UnknownStatus { code }
            | Self::RedirectNotAllowed { code } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_status_known_code() {
        let err = Error::for_status(404);
        assert!(matches!(err, Error::HttpStatus { code: 404, ref reason } if reason == "Not Found"));
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn test_for_status_unknown_code() {
        let err = Error::for_status(599);
        assert!(matches!(err, Error::UnknownStatus { code: 599 }));
        assert_eq!(err.status(), Some(599));
    }

    #[test]
    fn test_for_status_informational_is_unknown() {
        assert!(matches!(Error::for_status(101), Error::UnknownStatus { code: 101 }));
        assert!(matches!(Error::for_status(100), Error::UnknownStatus { code: 100 }));
        assert!(matches!(Error::for_status(300), Error::HttpStatus { code: 300, .. }));
    }

    #[test]
    fn test_classification() {
        assert!(Error::connection("refused").is_connection());
        assert!(Error::tls("handshake").is_connection());
        assert!(Error::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(Error::invalid_argument("bad").is_invalid_argument());
        assert!(!Error::parse("bad").is_connection());
    }
}
