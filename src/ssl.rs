//! Certificate identity checks (RFC 2818 section 3.1).
//!
//! Chain validation is left to rustls; this module only decides whether a
//! certificate names the host that was requested.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use x509_parser::extensions::GeneralName;

use crate::error::{Error, Result};

/// Identity fields extracted from a peer certificate.
///
/// `subject_alt_name` uses the textual form `DNS: a.example, DNS: b.example`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    pub common_name: Option<String>,
    pub subject_alt_name: Option<String>,
}

impl Certificate {
    pub fn new(common_name: Option<&str>, subject_alt_name: Option<&str>) -> Self {
        Self {
            common_name: common_name.map(str::to_string),
            subject_alt_name: subject_alt_name.map(str::to_string),
        }
    }

    /// Extract subject CN and SAN entries from a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| Error::tls(format!("failed to parse peer certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let subject_alt_name = match cert.subject_alternative_name() {
            Ok(Some(ext)) => {
                let entries: Vec<String> = ext
                    .value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(format!("DNS:{}", dns)),
                        GeneralName::IPAddress(bytes) => {
                            ip_from_bytes(bytes).map(|ip| format!("IP Address:{}", ip))
                        }
                        _ => None,
                    })
                    .collect();
                Some(entries.join(", "))
            }
            Ok(None) => None,
            Err(e) => return Err(Error::tls(format!("malformed subjectAltName: {}", e))),
        };

        Ok(Self {
            common_name,
            subject_alt_name,
        })
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

/// Check that `cert` is valid for `host`.
///
/// DNS entries in subjectAltName take precedence; the CN is consulted only
/// when no DNS entry is present at all.
pub fn verify_certificate(host: &str, cert: &Certificate) -> bool {
    let mut has_dns_alt_name = false;

    if let Some(alt_names) = cert.subject_alt_name.as_deref().filter(|s| !s.is_empty()) {
        for entry in alt_names.split(',') {
            let Some((kind, value)) = entry.trim().split_once(':') else {
                continue;
            };
            if kind.trim() != "DNS" {
                continue;
            }
            has_dns_alt_name = true;
            if match_domain(host, value.trim()) {
                return true;
            }
        }

        if has_dns_alt_name {
            return false;
        }
    }

    match cert.common_name.as_deref() {
        Some(cn) if !cn.is_empty() => match_domain(host, cn),
        _ => false,
    }
}

/// A reference name may carry a wildcard only as the entire first label,
/// followed by at least two more labels.
pub fn verify_reference_name(reference: &str) -> bool {
    let mut parts = reference.split('.');
    let first = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    if first.contains('*') && (first != "*" || rest.len() < 2) {
        return false;
    }

    !rest.iter().any(|part| part.contains('*'))
}

/// Match a host against a single certificate reference name.
pub fn match_domain(host: &str, reference: &str) -> bool {
    if !verify_reference_name(reference) {
        return false;
    }

    let host = host.to_ascii_lowercase();
    let reference = reference.to_ascii_lowercase();

    if host == reference {
        return true;
    }

    // No wildcard matching for IP literals
    if host.parse::<IpAddr>().is_ok() {
        return false;
    }

    match host.split_once('.') {
        Some((_, rest)) => format!("*.{}", rest) == reference,
        None => false,
    }
}
