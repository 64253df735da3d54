//! RFC 6265 cookie handling.
//!
//! Cookies keep their attributes in an ordered map whose keys are compared
//! case-insensitively. `normalize` turns `expires`/`max-age` into absolute
//! Unix timestamps and drops attributes whose values cannot be understood.
//!
//! A cookie constructed by hand has no `domain` or `path` and therefore
//! matches every request. Cookies obtained from `Set-Cookie` headers always
//! receive an origin-derived domain and path.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use url::Url;

use crate::headers::Headers;

/// Value of a single cookie attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Bare attribute without `=`, e.g. `Secure` or `HttpOnly`.
    Flag,
    /// Textual value as received.
    Text(String),
    /// Absolute Unix timestamp (`expires` and `max-age` after normalization).
    Time(i64),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<i64> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Time(t) => write!(f, "{}", t),
        }
    }
}

/// Bookkeeping flags attached to a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieFlags {
    pub creation: i64,
    pub last_access: i64,
    pub persistent: bool,
    /// Restricts matching to the exact stored domain.
    pub host_only: bool,
}

impl Default for CookieFlags {
    fn default() -> Self {
        let now = now();
        Self {
            creation: now,
            last_access: now,
            persistent: false,
            host_only: true,
        }
    }
}

/// A single cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    attributes: Vec<(String, AttributeValue)>,
    pub flags: CookieFlags,
    /// Used instead of the wall clock for `max-age` and expiry checks.
    pub reference_time: i64,
}

impl Cookie {
    /// Manual cookie: no attributes, host-only, matches every URI.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attributes: Vec::new(),
            flags: CookieFlags::default(),
            reference_time: now(),
        }
    }

    /// Build a cookie from raw attributes and normalize them.
    ///
    /// Later attributes replace earlier ones with the same (case-insensitive) key.
    pub fn with_attributes<K, I>(
        name: impl Into<String>,
        value: impl Into<String>,
        attributes: I,
        reference_time: Option<i64>,
    ) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, AttributeValue)>,
    {
        let mut cookie = Self::new(name, value);
        if let Some(time) = reference_time {
            cookie.reference_time = time;
        }
        for (key, value) in attributes {
            cookie.put_raw(key.into(), value);
        }
        cookie.normalize();
        cookie
    }

    /// Add or replace one attribute, normalizing it.
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn with_flags(mut self, flags: CookieFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_reference_time(mut self, reference_time: i64) -> Self {
        self.reference_time = reference_time;
        self
    }

    /// Add or replace one attribute. Unparseable values remove the key.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: AttributeValue) {
        let key = key.into();
        match self.normalize_attribute(&key, value) {
            Some(value) => self.put_raw(key, value),
            None => {
                self.remove_attribute(&key);
            }
        }
    }

    fn put_raw(&mut self, key: String, value: AttributeValue) {
        match self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
        let idx = self
            .attributes
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(key))?;
        Some(self.attributes.remove(idx).1)
    }

    /// Attributes in insertion order, keys with their original casing.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn domain(&self) -> Option<&str> {
        self.attribute("domain").and_then(AttributeValue::as_str)
    }

    pub fn path(&self) -> Option<&str> {
        self.attribute("path").and_then(AttributeValue::as_str)
    }

    pub fn expires(&self) -> Option<i64> {
        self.attribute("expires").and_then(AttributeValue::as_time)
    }

    pub fn max_age(&self) -> Option<i64> {
        self.attribute("max-age").and_then(AttributeValue::as_time)
    }

    pub fn is_secure(&self) -> bool {
        match self.attribute("secure") {
            Some(AttributeValue::Text(s)) => !s.is_empty() && s != "0",
            Some(_) => true,
            None => false,
        }
    }

    /// Whether the cookie has expired relative to `reference_time`.
    ///
    /// `max-age` takes precedence over `expires`; a timestamp equal to the
    /// reference time is still valid.
    pub fn is_expired(&self) -> bool {
        if let Some(max_age) = self.max_age() {
            return max_age < self.reference_time;
        }
        if let Some(expires) = self.expires() {
            return expires < self.reference_time;
        }
        false
    }

    /// Check domain, path and `secure` against a request URI.
    pub fn uri_matches(&self, uri: &Url) -> bool {
        let domain_ok = match uri.host_str() {
            Some(host) => self.domain_matches(host),
            None => self.domain().is_none(),
        };
        if !domain_ok || !self.path_matches(uri.path()) {
            return false;
        }
        !self.is_secure() || uri.scheme() == "https"
    }

    /// Domain-match per RFC 6265 section 5.1.3.
    pub fn domain_matches(&self, host: &str) -> bool {
        let Some(cookie_domain) = self.domain() else {
            // Manually created cookie
            return true;
        };

        if cookie_domain.eq_ignore_ascii_case(host) {
            return true;
        }

        if self.flags.host_only {
            return false;
        }

        if host.len() <= cookie_domain.len() {
            return false;
        }

        let host = host.to_ascii_lowercase();
        let Some(prefix) = host.strip_suffix(cookie_domain) else {
            return false;
        };
        if !prefix.ends_with('.') {
            return false;
        }

        // IP literals never match as suffixes.
        cookie_domain.parse::<Ipv4Addr>().is_err() && !ends_with_ipv4(&host)
    }

    /// Path-match per RFC 6265 section 5.1.4.
    pub fn path_matches(&self, request_path: &str) -> bool {
        let request_path = if request_path.is_empty() { "/" } else { request_path };

        let Some(cookie_path) = self.path() else {
            return true;
        };

        if cookie_path == request_path {
            return true;
        }

        if request_path.len() > cookie_path.len() && request_path.starts_with(cookie_path) {
            if cookie_path.ends_with('/') {
                return true;
            }
            if request_path.as_bytes()[cookie_path.len()] == b'/' {
                return true;
            }
        }

        false
    }

    /// Re-normalize every attribute, dropping those that fail.
    pub fn normalize(&mut self) {
        let attributes = std::mem::take(&mut self.attributes);
        for (key, value) in attributes {
            if let Some(value) = self.normalize_attribute(&key, value) {
                self.attributes.push((key, value));
            }
        }
    }

    /// Normalize one attribute value; `None` means the attribute is dropped.
    pub fn normalize_attribute(&self, key: &str, value: AttributeValue) -> Option<AttributeValue> {
        match key.to_ascii_lowercase().as_str() {
            "expires" => match value {
                AttributeValue::Time(t) => Some(AttributeValue::Time(t)),
                AttributeValue::Text(s) => parse_cookie_date(&s).map(AttributeValue::Time),
                AttributeValue::Flag => None,
            },
            "max-age" => match value {
                AttributeValue::Time(t) => Some(AttributeValue::Time(t)),
                AttributeValue::Text(s) => {
                    let delta = parse_delta_seconds(&s)?;
                    let expiry = if delta <= 0 {
                        0
                    } else {
                        self.reference_time.saturating_add(delta)
                    };
                    Some(AttributeValue::Time(expiry))
                }
                AttributeValue::Flag => None,
            },
            "domain" => {
                let AttributeValue::Text(s) = value else {
                    return None;
                };
                let s = s.strip_prefix('.').unwrap_or(&s);
                if s.is_empty() {
                    return None;
                }
                Some(AttributeValue::Text(s.to_ascii_lowercase()))
            }
            _ => Some(value),
        }
    }

    /// Parse a `Set-Cookie` value.
    ///
    /// A first segment without `=` is treated as a bare value named `default_name`.
    pub fn parse(header: &str, default_name: &str, reference_time: Option<i64>) -> Self {
        let mut parts = header.split(';');
        let first = parts.next().unwrap_or_default();
        let (name, value) = match first.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (default_name.trim(), first.trim()),
        };

        let attributes = parts.filter_map(|part| {
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => (key.trim(), AttributeValue::text(value.trim())),
                None => (part.trim(), AttributeValue::Flag),
            };
            (!key.is_empty()).then(|| (key.to_string(), value))
        });

        Self::with_attributes(name, value, attributes, reference_time)
    }

    /// Parse every `Set-Cookie` header of a response.
    ///
    /// Cookies whose `domain` does not cover the origin host are dropped.
    /// Missing domains default to the origin host (host-only) and missing or
    /// relative paths default to the origin's directory.
    pub fn parse_from_headers(
        headers: &Headers,
        origin: Option<&Url>,
        reference_time: Option<i64>,
    ) -> Vec<Cookie> {
        let mut cookies: Vec<Cookie> = Vec::new();

        for header in headers.get_all("Set-Cookie") {
            let mut parsed = Cookie::parse(header, "", reference_time);

            match origin.and_then(Url::host_str) {
                Some(host) if parsed.domain().is_none() => {
                    parsed.put_raw("domain".into(), AttributeValue::text(host.to_ascii_lowercase()));
                    parsed.flags.host_only = true;
                }
                _ => parsed.flags.host_only = false,
            }

            let path_is_valid = parsed.path().is_some_and(|p| p.starts_with('/'));
            if let (false, Some(origin)) = (path_is_valid, origin) {
                parsed.put_raw("path".into(), AttributeValue::text(default_path(origin.path())));
            }

            if let Some(host) = origin.and_then(Url::host_str) {
                if !parsed.domain_matches(host) {
                    tracing::debug!(
                        cookie = %parsed.name,
                        domain = parsed.domain().unwrap_or_default(),
                        host,
                        "rejecting cookie for foreign domain"
                    );
                    continue;
                }
            }

            match cookies.iter_mut().find(|c| c.name == parsed.name) {
                Some(existing) => *existing = parsed,
                None => cookies.push(parsed),
            }
        }

        cookies
    }

    /// `name=value` for a `Cookie` request header.
    pub fn format_for_header(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// `Set-Cookie` representation including attributes.
    pub fn format_for_set_cookie(&self) -> String {
        let mut out = self.format_for_header();
        for (key, value) in &self.attributes {
            out.push_str("; ");
            out.push_str(key);
            if *value != AttributeValue::Flag {
                out.push('=');
                out.push_str(&value.to_string());
            }
        }
        out
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Name-keyed cookie store; iteration follows insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie. A cookie with the same name is replaced in place.
    pub fn store(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn add(&mut self, cookie: Cookie) {
        self.store(cookie);
    }

    /// Merge cookies, last write wins per name.
    pub fn merge(&mut self, cookies: impl IntoIterator<Item = Cookie>) {
        for cookie in cookies {
            self.store(cookie);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Cookie> {
        let idx = self.cookies.iter().position(|c| c.name == name)?;
        Some(self.cookies.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Unexpired cookies that apply to `url`.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<&Cookie> {
        self.cookies
            .iter()
            .filter(|c| !c.is_expired() && c.uri_matches(url))
            .collect()
    }

    /// `Cookie` header value for `url`, or `None` when nothing applies.
    pub fn build_cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| c.format_for_header())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Parse `Set-Cookie` headers received from `origin` into the jar.
    pub fn store_from_headers(&mut self, headers: &Headers, origin: &Url) {
        self.merge(Cookie::parse_from_headers(headers, Some(origin), None));
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl FromIterator<Cookie> for CookieJar {
    fn from_iter<I: IntoIterator<Item = Cookie>>(iter: I) -> Self {
        let mut jar = CookieJar::new();
        jar.merge(iter);
        jar
    }
}

impl<'a> IntoIterator for &'a CookieJar {
    type Item = &'a Cookie;
    type IntoIter = std::slice::Iter<'a, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.cookies.iter()
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Host ends in four numeric labels, e.g. `abc.127.0.0.1`.
fn ends_with_ipv4(host: &str) -> bool {
    let labels: Vec<&str> = host.rsplitn(5, '.').collect();
    labels.len() == 5
        && labels[..4]
            .iter()
            .all(|l| (1..=3).contains(&l.len()) && l.bytes().all(|b| b.is_ascii_digit()))
}

/// RFC 6265 section 5.1.4 default-path of a request URI path.
fn default_path(uri_path: &str) -> String {
    if !uri_path.starts_with('/') || uri_path.matches('/').count() == 1 {
        return "/".to_string();
    }
    match uri_path.rfind('/') {
        Some(idx) => uri_path[..idx].to_string(),
        None => "/".to_string(),
    }
}

fn parse_delta_seconds(value: &str) -> Option<i64> {
    let digits = value.strip_prefix('-').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match value.parse::<i64>() {
        Ok(delta) => Some(delta),
        // Out of range: saturate in the direction of the sign.
        Err(_) if value.starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

/// Parse the date formats seen in `Expires` attributes.
fn parse_cookie_date(date_str: &str) -> Option<i64> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.timestamp());
    }

    const DATETIME_FORMATS: [&str; 6] = [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%A, %d-%b-%Y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%SZ",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }

    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d %B %Y", "%d %b %Y"];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path() {
        assert_eq!(default_path(""), "/");
        assert_eq!(default_path("/"), "/");
        assert_eq!(default_path("/test"), "/");
        assert_eq!(default_path("/test/"), "/test");
        assert_eq!(default_path("/test/abc"), "/test");
        assert_eq!(default_path("/test/abc/"), "/test/abc");
    }

    #[test]
    fn test_ends_with_ipv4() {
        assert!(ends_with_ipv4("abc.127.0.0.1"));
        assert!(!ends_with_ipv4("127.0.0.1"));
        assert!(!ends_with_ipv4("www.example.com"));
        assert!(!ends_with_ipv4("a.1234.0.0.1"));
    }

    #[test]
    fn test_parse_delta_seconds() {
        assert_eq!(parse_delta_seconds("10"), Some(10));
        assert_eq!(parse_delta_seconds("-1000"), Some(-1000));
        assert_eq!(parse_delta_seconds("1e6"), None);
        assert_eq!(parse_delta_seconds(""), None);
        assert_eq!(parse_delta_seconds("-"), None);
    }

    #[test]
    fn test_parse_cookie_date_formats() {
        // 2013-12-05 04:50:12 UTC
        let expected = 1_386_219_012;
        assert_eq!(parse_cookie_date("Thu, 05 Dec 2013 04:50:12 GMT"), Some(expected));
        assert_eq!(parse_cookie_date("Thu, 5-Dec-2013 04:50:12 GMT"), Some(expected));
        assert_eq!(parse_cookie_date("Thursday, 5-Dec-2013 04:50:12 GMT"), Some(expected));
        assert_eq!(parse_cookie_date("Thursday, 05-Dec-13 04:50:12 GMT"), Some(expected));
        assert_eq!(parse_cookie_date("Thu Dec  5 04:50:12 2013"), Some(expected));
        assert_eq!(parse_cookie_date("2022-04-07"), Some(1_649_289_600));
        assert_eq!(parse_cookie_date("10 September 2000"), Some(968_544_000));
        assert_eq!(parse_cookie_date("never"), None);
    }

    #[test]
    fn test_normalize_domain() {
        let cookie = Cookie::with_attributes(
            "a",
            "b",
            [("Domain", AttributeValue::text(".Example.COM"))],
            Some(0),
        );
        assert_eq!(cookie.domain(), Some("example.com"));
        // Key casing is preserved
        assert_eq!(cookie.attributes().next().map(|(k, _)| k), Some("Domain"));
    }

    #[test]
    fn test_normalize_drops_invalid() {
        let cookie = Cookie::with_attributes(
            "a",
            "b",
            [
                ("domain", AttributeValue::text("")),
                ("expires", AttributeValue::Flag),
                ("max-age", AttributeValue::text("invalid")),
            ],
            Some(0),
        );
        assert_eq!(cookie.attributes().count(), 0);
    }
}
