use tokio::io::{AsyncRead, AsyncReadExt};

use super::body::BodyFraming;
use crate::constants::{DEFAULT_CONNECT_PORT, DEFAULT_HTTP_PORT, MAX_HEAD_SIZE, MAX_HEADERS};
use crate::error::{Result, TunnelError};
use crate::models::Target;

/// Request line and headers of a proxied request
///
/// Only what routing needs is decoded; the raw bytes are forwarded as
/// received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,

    /// Request target as sent: authority for CONNECT, absolute URI or path otherwise
    pub target: String,

    /// Minor HTTP version (`1` for HTTP/1.1)
    pub version: u8,

    /// Headers in received order, values decoded lossily
    pub headers: Vec<(String, String)>,

    /// Bytes taken by the request line and headers including the blank line
    pub head_len: usize,
}

impl RequestHead {
    /// Parse a request head from `buf`
    ///
    /// Returns `Ok(None)` when `buf` holds only part of a head.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(buf) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => return Err(TunnelError::MalformedRequest(e.to_string())),
        };

        let method = req
            .method
            .ok_or_else(|| TunnelError::MalformedRequest("missing method".to_string()))?;
        let target = req
            .path
            .ok_or_else(|| TunnelError::MalformedRequest("missing request target".to_string()))?;
        let version = req
            .version
            .ok_or_else(|| TunnelError::MalformedRequest("missing HTTP version".to_string()))?;

        let headers = req
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).trim().to_string(),
                )
            })
            .collect();

        Ok(Some(Self {
            method: method.to_string(),
            target: target.to_string(),
            version,
            headers,
            head_len,
        }))
    }

    /// Whether this is a CONNECT tunnel request
    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    /// First value of header `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Destination of the request
    ///
    /// CONNECT uses its authority (default port 443). Other methods use the
    /// absolute URI when present, then the `Host` header (default port 80).
    pub fn resolve_target(&self) -> Result<Target> {
        if self.is_connect() {
            return Target::parse_authority(&self.target, DEFAULT_CONNECT_PORT);
        }

        if self.is_absolute_form() {
            return Target::from_absolute_uri(&self.target);
        }

        match self.header("host") {
            Some(host) if !host.is_empty() => Target::parse_authority(host, DEFAULT_HTTP_PORT),
            _ => Err(TunnelError::MalformedRequest(
                "missing Host header".to_string(),
            )),
        }
    }

    /// Whether the request target is an absolute URI rather than a path
    fn is_absolute_form(&self) -> bool {
        !self.target.starts_with('/') && self.target.contains("://")
    }

    /// How the body following this head is delimited
    ///
    /// `Transfer-Encoding` wins over `Content-Length`; a transfer coding
    /// other than a final `chunked` leaves no way to find the end of the
    /// body and is rejected.
    pub fn body_framing(&self) -> Result<BodyFraming> {
        let codings: Vec<&str> = self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("transfer-encoding"))
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if let Some(last) = codings.last() {
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
            return Err(TunnelError::MalformedRequest(format!(
                "unsupported transfer coding: {}",
                last
            )));
        }

        let mut length = None;
        for (_, value) in self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        {
            for part in value.split(',') {
                let parsed = part.trim().parse::<u64>().map_err(|_| {
                    TunnelError::MalformedRequest(format!("invalid Content-Length: {}", value))
                })?;
                if length.is_some_and(|l| l != parsed) {
                    return Err(TunnelError::MalformedRequest(
                        "conflicting Content-Length values".to_string(),
                    ));
                }
                length = Some(parsed);
            }
        }

        Ok(BodyFraming::Length(length.unwrap_or(0)))
    }
}

/// A parsed head together with every byte read so far
#[derive(Debug)]
pub struct IncomingRequest {
    pub head: RequestHead,
    raw: Vec<u8>,
}

impl IncomingRequest {
    /// The request line and headers exactly as received
    pub fn head_bytes(&self) -> &[u8] {
        &self.raw[..self.head.head_len]
    }

    /// Bytes the client sent after the head (body or early tunnel data)
    pub fn leftover(&self) -> &[u8] {
        &self.raw[self.head.head_len..]
    }

    /// Everything received, head first
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Read from `reader` until a full request head is available
///
/// Returns `Ok(None)` when the peer closes before sending anything.
pub async fn read_request_head<R>(reader: &mut R) -> Result<Option<IncomingRequest>>
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if raw.is_empty() {
                return Ok(None);
            }
            return Err(TunnelError::MalformedRequest(
                "connection closed before end of request head".to_string(),
            ));
        }
        raw.extend_from_slice(&chunk[..n]);

        if let Some(head) = RequestHead::parse(&raw)? {
            if head.head_len > MAX_HEAD_SIZE {
                return Err(TunnelError::HeadTooLarge(MAX_HEAD_SIZE));
            }
            return Ok(Some(IncomingRequest { head, raw }));
        }

        if raw.len() > MAX_HEAD_SIZE {
            return Err(TunnelError::HeadTooLarge(MAX_HEAD_SIZE));
        }
    }
}
