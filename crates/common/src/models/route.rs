use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{Result, TunnelError};
use crate::validation::{normalize_host, validate_host};

/// Transport chosen for a proxied connection
///
/// Derived from the allow-list for every connection and never stored
/// beyond the connection that computed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Direct,
    Tunnel,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Direct => f.write_str("direct"),
            Route::Tunnel => f.write_str("tunnel"),
        }
    }
}

/// Destination of a proxied connection
///
/// The host is normalized (lowercase, no trailing dot) and IPv6 literals
/// are kept without brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Create a target from an already validated host
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: normalize_host(&host.into()),
            port,
        }
    }

    /// Parse a `host[:port]` authority, using `default_port` when absent
    ///
    /// Accepts bracketed IPv6 literals (`[::1]:443`). A bare IPv6 literal
    /// without brackets is taken as a host with no port.
    pub fn parse_authority(authority: &str, default_port: u16) -> Result<Self> {
        let authority = authority.trim();
        if authority.is_empty() {
            return Err(TunnelError::MalformedRequest("empty authority".to_string()));
        }

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(|| {
                TunnelError::MalformedRequest(format!("unterminated IPv6 literal: {}", authority))
            })?;
            let port = match after {
                "" => None,
                other => Some(other.strip_prefix(':').ok_or_else(|| {
                    TunnelError::MalformedRequest(format!("invalid authority: {}", authority))
                })?),
            };
            (host, port)
        } else if authority.matches(':').count() == 1 {
            let (host, port) = authority.split_once(':').unwrap_or((authority, ""));
            (host, Some(port))
        } else {
            (authority, None)
        };

        let port = match port {
            None => default_port,
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    TunnelError::MalformedRequest(format!("invalid port in authority: {}", authority))
                })?,
        };

        validate_host(host).map_err(|e| TunnelError::MalformedRequest(e.to_string()))?;

        Ok(Self::new(host, port))
    }

    /// Extract the target of an absolute-form request URI
    pub fn from_absolute_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| TunnelError::MalformedRequest(format!("invalid URI {}: {}", uri, e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TunnelError::MalformedRequest(format!("URI without host: {}", uri)))?;
        let port = url.port_or_known_default().ok_or_else(|| {
            TunnelError::MalformedRequest(format!("no port for scheme {}", url.scheme()))
        })?;

        validate_host(host).map_err(|e| TunnelError::MalformedRequest(e.to_string()))?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
