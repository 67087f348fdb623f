//! Domain classifier
//!
//! Decides, per connection, whether a host goes through the tunnel or
//! direct. The allow-list is built once at start up and only read
//! afterwards, so it is shared between connection tasks without locking.
//!
//! Entries are either an exact host (`hot.net.il`) or a wildcard suffix
//! (`*.hot.net.il`). A wildcard matches any proper subdomain but not the
//! bare domain; list both when both are wanted.

use crate::error::{Result, TunnelError};
use crate::models::Route;
use crate::validation::{normalize_host, validate_pattern};

/// Immutable set of hosts routed through the tunnel
#[derive(Debug, Clone, Default)]
pub struct DomainAllowList {
    /// Normalized patterns in configuration order, duplicates removed
    patterns: Vec<String>,
    /// Exact hosts (lowercased)
    exact: Vec<String>,
    /// Wildcard suffixes including the leading dot (e.g. ".hot.net.il")
    suffixes: Vec<String>,
}

impl DomainAllowList {
    /// Build an allow-list, rejecting any malformed entry
    ///
    /// # Examples
    ///
    /// ```
    /// use tunnelgate_common::{DomainAllowList, Route};
    ///
    /// let list = DomainAllowList::new(["hot.net.il", "*.hot.net.il"]).unwrap();
    /// assert_eq!(list.classify("selfservicetest.hot.net.il"), Route::Tunnel);
    /// assert_eq!(list.classify("example.com"), Route::Direct);
    /// ```
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();

        for pattern in patterns {
            let normalized = validate_pattern(pattern.as_ref())
                .map_err(|e| TunnelError::InvalidPattern(e.to_string()))?;

            if list.patterns.contains(&normalized) {
                continue;
            }

            match normalized.strip_prefix('*') {
                // *.example.com -> .example.com
                Some(suffix) => list.suffixes.push(suffix.to_string()),
                None => list.exact.push(normalized.clone()),
            }
            list.patterns.push(normalized);
        }

        Ok(list)
    }

    /// An allow-list that routes everything direct
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `host` matches any entry
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }

        if self.exact.iter().any(|h| *h == host) {
            return true;
        }

        self.suffixes
            .iter()
            .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
    }

    /// Route for `host`: `Tunnel` on a match, `Direct` otherwise
    pub fn classify(&self, host: &str) -> Route {
        if self.matches(host) {
            Route::Tunnel
        } else {
            Route::Direct
        }
    }

    /// Normalized patterns in configuration order
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Number of distinct entries
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no entry is configured (everything goes direct)
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
