//! Hostname validation and normalization
//!
//! Hosts arrive from three untrusted places: CONNECT authorities, absolute
//! URIs and `Host` headers. They are also read from the allow-list at start
//! up. All of them go through the same checks so the classifier only ever
//! compares normalized, well-formed names.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv6Addr;
use thiserror::Error;

/// Regex for DNS names and IPv4 literals: dot separated labels of
/// alphanumerics, `_` and inner `-`, with an optional trailing dot
static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_](?:[A-Za-z0-9_-]*[A-Za-z0-9_])?(?:\.[A-Za-z0-9_](?:[A-Za-z0-9_-]*[A-Za-z0-9_])?)*\.?$")
        .unwrap()
});

/// Maximum length of a DNS name
pub const MAX_HOST_LENGTH: usize = 253;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Host too long: {0} bytes (max: {1})")]
    HostTooLong(usize, usize),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// Normalize a host for comparison
///
/// Strips IPv6 brackets and a trailing dot, and lowercases ASCII.
///
/// # Examples
///
/// ```
/// use tunnelgate_common::validation::normalize_host;
///
/// assert_eq!(normalize_host("Hot.Net.IL."), "hot.net.il");
/// assert_eq!(normalize_host("[::1]"), "::1");
/// ```
pub fn normalize_host(host: &str) -> String {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Validate a host (DNS name, IPv4 or IPv6 literal, brackets optional)
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.len() > MAX_HOST_LENGTH {
        return Err(ValidationError::HostTooLong(host.len(), MAX_HOST_LENGTH));
    }

    let bracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'));
    let bare = bracketed.unwrap_or(host);

    if bracketed.is_some() || bare.contains(':') {
        return bare
            .parse::<Ipv6Addr>()
            .map(|_| ())
            .map_err(|_| ValidationError::InvalidHost(truncate(host)));
    }

    if !HOSTNAME_REGEX.is_match(bare) {
        return Err(ValidationError::InvalidHost(truncate(host)));
    }

    Ok(())
}

/// Validate an allow-list pattern and return its normalized form
///
/// A pattern is either a host or `*.` followed by a host. No other use of
/// `*` is accepted.
///
/// # Examples
///
/// ```
/// use tunnelgate_common::validation::validate_pattern;
///
/// assert_eq!(validate_pattern("*.HOT.net.il").unwrap(), "*.hot.net.il");
/// assert!(validate_pattern("hot.*.il").is_err());
/// assert!(validate_pattern("hot.net.il:443").is_err());
/// ```
pub fn validate_pattern(pattern: &str) -> Result<String, ValidationError> {
    let trimmed = pattern.trim();
    let (wildcard, host) = match trimmed.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    if host.is_empty() || host.contains('*') {
        return Err(ValidationError::InvalidPattern(truncate(pattern)));
    }

    validate_host(host).map_err(|_| ValidationError::InvalidPattern(truncate(pattern)))?;

    let normalized = normalize_host(host);
    if wildcard {
        Ok(format!("*.{}", normalized))
    } else {
        Ok(normalized)
    }
}

fn truncate(value: &str) -> String {
    value.chars().take(64).collect() // Limit error message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_host_valid() {
        assert!(validate_host("hot.net.il").is_ok());
        assert!(validate_host("selfservicetest.hot.net.il").is_ok());
        assert!(validate_host("hot-qc11-01").is_ok());
        assert!(validate_host("localhost").is_ok());
        assert!(validate_host("example.com.").is_ok());
        assert!(validate_host("127.0.0.1").is_ok());
        assert!(validate_host("::1").is_ok());
        assert!(validate_host("[2001:db8::1]").is_ok());
        assert!(validate_host("_dmarc.example.com").is_ok());
    }

    #[test]
    fn test_validate_host_invalid() {
        assert!(validate_host("").is_err());
        assert!(validate_host("-leading.example.com").is_err());
        assert!(validate_host("trailing-.example.com").is_err());
        assert!(validate_host("double..dot").is_err());
        assert!(validate_host("with space.com").is_err());
        assert!(validate_host("evil.com/path").is_err());
        assert!(validate_host("host:80").is_err());
        assert!(validate_host("[not-an-ip]").is_err());
    }

    #[test]
    fn test_validate_host_too_long() {
        let long = format!("{}.com", "a".repeat(260));
        assert!(matches!(
            validate_host(&long),
            Err(ValidationError::HostTooLong(_, MAX_HOST_LENGTH))
        ));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("EXAMPLE.com"), "example.com");
        assert_eq!(normalize_host("example.com."), "example.com");
        assert_eq!(normalize_host("[2001:DB8::1]"), "2001:db8::1");
        assert_eq!(normalize_host("hot.net.il"), "hot.net.il");
    }

    #[test]
    fn test_validate_pattern() {
        assert_eq!(validate_pattern("hot.net.il").unwrap(), "hot.net.il");
        assert_eq!(validate_pattern("  Hot.Net.Il ").unwrap(), "hot.net.il");
        assert_eq!(validate_pattern("*.hot.net.il").unwrap(), "*.hot.net.il");

        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("*").is_err());
        assert!(validate_pattern("*.").is_err());
        assert!(validate_pattern("**.hot.net.il").is_err());
        assert!(validate_pattern("hot*.net.il").is_err());
        assert!(validate_pattern("hot-qc11-01:8080").is_err());
    }
}
