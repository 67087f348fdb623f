//! Tunnel transports
//!
//! The single-hop deployment (proxy straight into a local inspection tool)
//! and the two-sided deployment (proxy into an SSH-forwarded port and a
//! bridge on the far host) differ only in how a tunnel session is opened.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tunnelgate_common::{Result, Target, TunnelError, TunnelSession, dial};

use crate::config::{TunnelConfig, TunnelMode};
use crate::tunnel::TunnelClient;

/// Opens the connection backing a TUNNEL-routed request
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    /// Open a session that will carry traffic for `target`
    async fn open(&self, target: &Target) -> Result<(TcpStream, TunnelSession)>;

    /// Short description for start-up logs
    fn describe(&self) -> String;
}

/// Build the transport selected by `config`
pub fn from_config(config: &TunnelConfig, connect_timeout: Duration) -> Box<dyn TunnelTransport> {
    match config.mode {
        TunnelMode::Fixed => Box::new(FixedPortTransport::new(
            Target::new(config.host.as_str(), config.port),
            connect_timeout,
        )),
        TunnelMode::Forwarded => Box::new(ForwardedPortTransport::new(
            TunnelClient::new(config.host.as_str(), config.port, connect_timeout),
            config.preamble,
        )),
    }
}

/// Dials one fixed upstream for every tunnelled request
#[derive(Debug, Clone)]
pub struct FixedPortTransport {
    upstream: Target,
    connect_timeout: Duration,
}

impl FixedPortTransport {
    pub fn new(upstream: Target, connect_timeout: Duration) -> Self {
        Self {
            upstream,
            connect_timeout,
        }
    }
}

#[async_trait]
impl TunnelTransport for FixedPortTransport {
    async fn open(&self, target: &Target) -> Result<(TcpStream, TunnelSession)> {
        let stream = match dial(&self.upstream, self.connect_timeout).await {
            Ok(stream) => stream,
            Err(e @ TunnelError::ConnectTimeout(_)) => return Err(e),
            Err(e) => {
                return Err(TunnelError::UpstreamConnect {
                    target: self.upstream.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Ok((stream, TunnelSession::open(Some(target.clone()))))
    }

    fn describe(&self) -> String {
        format!("fixed upstream {}", self.upstream)
    }
}

/// Dials through the SSH-forwarded port into the bridge
#[derive(Debug, Clone)]
pub struct ForwardedPortTransport {
    client: TunnelClient,
    preamble: bool,
}

impl ForwardedPortTransport {
    pub fn new(client: TunnelClient, preamble: bool) -> Self {
        Self { client, preamble }
    }
}

#[async_trait]
impl TunnelTransport for ForwardedPortTransport {
    async fn open(&self, target: &Target) -> Result<(TcpStream, TunnelSession)> {
        let announced = self.preamble.then_some(target);
        let (stream, mut session) = self.client.open_session(announced).await?;
        // Raw sessions still record what they carry
        session.target.get_or_insert_with(|| target.clone());
        Ok((stream, session))
    }

    fn describe(&self) -> String {
        let framing = if self.preamble { "with preamble" } else { "raw" };
        format!("forwarded port {} ({})", self.client.addr(), framing)
    }
}
