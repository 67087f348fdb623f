//! Target preamble spoken between the tunnel client and the bridge
//!
//! When several destinations share one forwarded port, each tunnel session
//! starts with a single line naming its target:
//!
//! ```text
//! near -> far   TUNNELGATE/1 hot.net.il:443\r\n
//! far  -> near  OK\r\n            (or ERR <reason>\r\n)
//! ```
//!
//! Payload bytes only flow after the reply. Sessions to a bridge with a
//! static destination carry no preamble at all.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{DEFAULT_CONNECT_PORT, MAX_PREAMBLE_LEN};
use crate::error::{Result, TunnelError};
use crate::models::Target;

/// Protocol tag opening every preamble line
pub const PREAMBLE_PREFIX: &str = "TUNNELGATE/1";

/// Bridge answer to a preamble
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreambleReply {
    Ok,
    Err(String),
}

impl PreambleReply {
    /// Wire form including the line terminator
    pub fn encode(&self) -> String {
        match self {
            PreambleReply::Ok => "OK\r\n".to_string(),
            PreambleReply::Err(reason) => {
                // Keep the reply on one line
                let reason: String = reason.chars().filter(|c| !c.is_control()).collect();
                format!("ERR {}\r\n", reason)
            }
        }
    }

    /// Parse a reply line without its terminator
    pub fn parse(line: &str) -> Result<Self> {
        if line == "OK" {
            return Ok(PreambleReply::Ok);
        }
        match line.strip_prefix("ERR") {
            Some(reason) => Ok(PreambleReply::Err(reason.trim().to_string())),
            None => Err(TunnelError::InvalidPreamble(format!(
                "unexpected reply: {}",
                line.chars().take(64).collect::<String>()
            ))),
        }
    }
}

/// Wire form of the preamble for `target`
pub fn encode_preamble(target: &Target) -> String {
    format!("{} {}\r\n", PREAMBLE_PREFIX, target)
}

/// Parse a preamble line without its terminator
pub fn parse_preamble(line: &str) -> Result<Target> {
    let authority = line
        .strip_prefix(PREAMBLE_PREFIX)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| {
            TunnelError::InvalidPreamble(format!(
                "missing {} tag: {}",
                PREAMBLE_PREFIX,
                line.chars().take(64).collect::<String>()
            ))
        })?;

    Target::parse_authority(authority, DEFAULT_CONNECT_PORT)
        .map_err(|e| TunnelError::InvalidPreamble(e.to_string()))
}

/// Read one `\n`-terminated line of at most `max` bytes
///
/// Returns the line without `\r\n` and any bytes that arrived after it.
pub async fn read_line<R>(reader: &mut R, max: usize) -> Result<(String, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(128);
    let mut chunk = [0u8; 256];

    loop {
        if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let leftover = buf.split_off(pos + 1);
            buf.truncate(pos);
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            let line = String::from_utf8(buf)
                .map_err(|_| TunnelError::InvalidPreamble("line is not UTF-8".to_string()))?;
            return Ok((line, leftover));
        }

        if buf.len() > max {
            return Err(TunnelError::InvalidPreamble(format!(
                "line longer than {} bytes",
                max
            )));
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(TunnelError::InvalidPreamble(
                "connection closed before end of line".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Near side: announce `target` and wait for the bridge to accept it
///
/// The reply is read one byte at a time so payload bytes that follow it
/// stay in `stream`.
pub async fn request_preamble<S>(stream: &mut S, target: &Target) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(encode_preamble(target).as_bytes()).await?;
    stream.flush().await?;

    let mut line = Vec::with_capacity(64);
    loop {
        let byte = match stream.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TunnelError::InvalidPreamble(
                    "tunnel closed before reply".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_PREAMBLE_LEN {
            return Err(TunnelError::InvalidPreamble("reply too long".to_string()));
        }
        line.push(byte);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    let line = String::from_utf8_lossy(&line);
    match PreambleReply::parse(&line)? {
        PreambleReply::Ok => Ok(()),
        PreambleReply::Err(reason) => Err(TunnelError::PreambleRejected(reason)),
    }
}

/// Far side: read the target a session is meant for
///
/// The caller must answer with [`PreambleReply`] before relaying. Returns
/// the target and any payload bytes that arrived with the preamble.
pub async fn accept_preamble<R>(reader: &mut R) -> Result<(Target, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let (line, leftover) = read_line(reader, MAX_PREAMBLE_LEN).await?;
    let target = parse_preamble(&line)?;
    Ok((target, leftover))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_encode_preamble() {
        assert_eq!(
            encode_preamble(&Target::new("hot.net.il", 443)),
            "TUNNELGATE/1 hot.net.il:443\r\n"
        );
        assert_eq!(
            encode_preamble(&Target::new("::1", 8080)),
            "TUNNELGATE/1 [::1]:8080\r\n"
        );
    }

    #[test]
    fn test_parse_preamble() {
        let target = parse_preamble("TUNNELGATE/1 hot.net.il:443").unwrap();
        assert_eq!(target, Target::new("hot.net.il", 443));

        let target = parse_preamble("TUNNELGATE/1 [::1]:8080").unwrap();
        assert_eq!(target, Target::new("::1", 8080));
    }

    #[test]
    fn test_parse_preamble_invalid() {
        assert!(parse_preamble("GET / HTTP/1.1").is_err());
        assert!(parse_preamble("TUNNELGATE/1").is_err());
        assert!(parse_preamble("TUNNELGATE/1 ").is_err());
        assert!(parse_preamble("TUNNELGATE/2 hot.net.il:443").is_err());
        assert!(parse_preamble("TUNNELGATE/1 bad host:1").is_err());
    }

    #[test]
    fn test_reply_encoding() {
        assert_eq!(PreambleReply::Ok.encode(), "OK\r\n");
        assert_eq!(
            PreambleReply::Err("connection\r\nrefused".to_string()).encode(),
            "ERR connectionrefused\r\n"
        );

        assert_eq!(PreambleReply::parse("OK").unwrap(), PreambleReply::Ok);
        assert_eq!(
            PreambleReply::parse("ERR connection refused").unwrap(),
            PreambleReply::Err("connection refused".to_string())
        );
        assert!(PreambleReply::parse("HTTP/1.1 200 OK").is_err());
    }

    #[tokio::test]
    async fn test_read_line_returns_leftover() {
        let mut reader: &[u8] = b"OK\r\npayload";
        let (line, leftover) = read_line(&mut reader, 64).await.unwrap();
        assert_eq!(line, "OK");
        assert_eq!(leftover, b"payload");
    }

    #[tokio::test]
    async fn test_read_line_limits() {
        let long = vec![b'a'; 2048];
        let mut reader = &long[..];
        assert!(matches!(
            read_line(&mut reader, 1024).await,
            Err(TunnelError::InvalidPreamble(_))
        ));

        let mut reader: &[u8] = b"no newline";
        assert!(read_line(&mut reader, 1024).await.is_err());
    }

    #[tokio::test]
    async fn test_negotiation_accepted() {
        let (mut near, mut far) = duplex(256);

        let bridge = tokio::spawn(async move {
            let (target, early) = accept_preamble(&mut far).await.unwrap();
            // Payload right behind the reply must not be swallowed
            far.write_all(b"OK\r\nhello").await.unwrap();
            (target, early, far)
        });

        request_preamble(&mut near, &Target::new("hot.net.il", 443))
            .await
            .unwrap();

        let mut payload = [0u8; 5];
        near.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"hello");

        let (target, early, _far) = bridge.await.unwrap();
        assert_eq!(target, Target::new("hot.net.il", 443));
        assert!(early.is_empty());
    }

    #[tokio::test]
    async fn test_accept_preamble_keeps_early_payload() {
        let mut reader: &[u8] = b"TUNNELGATE/1 hot.net.il:80\r\nGET / HTTP/1.1\r\n";
        let (target, early) = accept_preamble(&mut reader).await.unwrap();
        assert_eq!(target, Target::new("hot.net.il", 80));
        assert_eq!(early, b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn test_negotiation_tunnel_closed() {
        let (mut near, far) = duplex(256);
        drop(far);

        assert!(
            request_preamble(&mut near, &Target::new("hot.net.il", 443))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_negotiation_rejected() {
        let (mut near, mut far) = duplex(256);

        tokio::spawn(async move {
            let _ = accept_preamble(&mut far).await.unwrap();
            far.write_all(PreambleReply::Err("connection refused".to_string()).encode().as_bytes())
                .await
                .unwrap();
        });

        let err = request_preamble(&mut near, &Target::new("down.example", 80))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::PreambleRejected(reason) if reason == "connection refused"));
    }
}
