//! Tunnel client
//!
//! Dials the local end of the SSH-forwarded port. The tunnel itself is set
//! up and kept alive outside this process; a missing tunnel only shows up
//! as a failed dial, which is never retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};
use tunnelgate_common::{
    ListenerHandle, RelayConfig, Result, Target, TunnelError, TunnelSession, bind, dial, relay,
    request_preamble, serve,
};

/// Opens sessions across the forwarded port
#[derive(Debug, Clone)]
pub struct TunnelClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TunnelClient {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    /// Address of the forwarded port, for log lines
    pub fn addr(&self) -> String {
        Target::new(self.host.as_str(), self.port).to_string()
    }

    /// Open one session through the tunnel
    ///
    /// With `target` set the preamble is exchanged before the stream is
    /// returned; without it the stream is a raw pipe to the bridge.
    pub async fn open_session(&self, target: Option<&Target>) -> Result<(TcpStream, TunnelSession)> {
        let port = Target::new(self.host.as_str(), self.port);
        let mut stream = match dial(&port, self.connect_timeout).await {
            Ok(stream) => stream,
            Err(e @ TunnelError::ConnectTimeout(_)) => return Err(e),
            Err(e) => {
                return Err(TunnelError::TunnelUnavailable {
                    addr: self.addr(),
                    reason: e.to_string(),
                });
            }
        };

        if let Some(target) = target {
            match timeout(self.connect_timeout, request_preamble(&mut stream, target)).await {
                Ok(result) => result?,
                Err(_) => return Err(TunnelError::ConnectTimeout(target.to_string())),
            }
        }

        let session = TunnelSession::open(target.cloned());
        debug!("Tunnel session {} opened via {}", session.id, self.addr());
        Ok((stream, session))
    }

    /// Accept raw connections on `listen` and pipe each into its own session
    pub async fn listen(
        self,
        listen: (&str, u16),
        relay_config: RelayConfig,
    ) -> Result<ListenerHandle> {
        let (host, port) = listen;
        let listener = bind(host, port).await?;
        let client = Arc::new(self);

        let target = client.addr();
        let handle = serve(listener, "tunnel client", move |stream, peer| {
            let client = Arc::clone(&client);
            async move { pipe(stream, peer, &client, &relay_config).await }
        })?;
        info!("Tunnel client listening on {} -> {}", handle.addr, target);

        Ok(handle)
    }
}

async fn pipe(
    stream: TcpStream,
    peer: SocketAddr,
    client: &TunnelClient,
    relay_config: &RelayConfig,
) -> Result<()> {
    let (tunnel, mut session) = client.open_session(None).await?;
    let stats = relay(stream, tunnel, relay_config).await;
    session.close(&stats);

    info!(
        "[{}] {} via tunnel closed: sent={} received={} end={}",
        session.id, peer, session.bytes_sent, session.bytes_received, stats.end
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let (mut r, mut w) = stream.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        port
    }

    async fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_open_session_raw() {
        let port = echo_server().await;
        let client = TunnelClient::new("127.0.0.1", port, Duration::from_secs(2));

        let (mut stream, session) = client.open_session(None).await.unwrap();
        assert!(session.is_open());
        assert!(session.target.is_none());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_tunnel_down_is_unavailable() {
        let client = TunnelClient::new("127.0.0.1", dead_port().await, Duration::from_secs(2));

        let err = client.open_session(None).await.unwrap_err();
        assert!(matches!(err, TunnelError::TunnelUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_preamble_rejected_by_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"ERR connection refused\r\n").await.unwrap();
        });

        let client = TunnelClient::new("127.0.0.1", port, Duration::from_secs(2));
        let err = client
            .open_session(Some(&Target::new("hot.net.il", 443)))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::PreambleRejected(_)));
    }

    #[tokio::test]
    async fn test_standalone_listener_pipes_raw_bytes() {
        let port = echo_server().await;
        let client = TunnelClient::new("127.0.0.1", port, Duration::from_secs(2));
        let handle = client
            .listen(("127.0.0.1", 0), RelayConfig::default())
            .await
            .unwrap();

        let mut stream = TcpStream::connect(handle.addr).await.unwrap();
        // No preamble: the first bytes on the tunnel are the client's own
        stream.write_all(b"TUNNELGATE? no, raw").await.unwrap();
        let mut buf = [0u8; 19];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"TUNNELGATE? no, raw");

        handle.shutdown();
    }
}
