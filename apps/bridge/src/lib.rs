//! Tunnel bridge endpoint
//!
//! Runs on the far host behind the SSH-forwarded port. Every connection that
//! arrives through the tunnel is relayed to its destination: one static
//! address, or the target named by the session's preamble. The bridge keeps
//! no state between sessions and can be restarted at any time.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};
use tunnelgate_common::{
    ListenerHandle, PreambleReply, Result, TunnelError, TunnelSession, accept_preamble, bind,
    dial, relay, serve, within_idle,
};

pub mod config;

pub use config::{Args, BridgeConfig, Destination};

/// Bind the bridge and start accepting sessions
pub async fn start(config: BridgeConfig) -> Result<ListenerHandle> {
    let listener = bind(&config.listen_host, config.listen_port).await?;
    let config = Arc::new(config);

    let destination = match &config.destination {
        Destination::Static(target) => target.to_string(),
        Destination::Preamble => "per-session targets".to_string(),
    };
    let handle = serve(listener, "bridge", move |stream, peer| {
        let config = Arc::clone(&config);
        async move { handle_connection(stream, peer, &config).await }
    })?;
    info!("Bridge listening on {} -> {}", handle.addr, destination);

    Ok(handle)
}

/// Relay one tunnel session to its destination
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &BridgeConfig,
) -> Result<()> {
    let preamble = config.destination.is_preamble();

    let (target, early) = match &config.destination {
        Destination::Static(target) => (target.clone(), Vec::new()),
        Destination::Preamble => match within_idle(
            config.relay.idle_timeout,
            accept_preamble(&mut stream),
        )
        .await
        {
            Some(Ok(announced)) => announced,
            None => {
                debug!("{} sent no preamble in time, closing", peer);
                return Ok(());
            }
            Some(Err(e)) => {
                let _ = reply(&mut stream, PreambleReply::Err("invalid preamble".to_string())).await;
                return Err(e);
            }
        },
    };

    let mut session = TunnelSession::open(Some(target.clone()));

    let mut upstream = match dial(&target, config.connect_timeout).await {
        Ok(upstream) => upstream,
        Err(e) => {
            if preamble {
                let _ = reply(&mut stream, PreambleReply::Err(reject_reason(&e).to_string())).await;
            }
            return Err(e);
        }
    };

    if preamble {
        reply(&mut stream, PreambleReply::Ok).await?;
    }
    if !early.is_empty() {
        upstream.write_all(&early).await?;
    }
    debug!("[{}] {} -> {}", session.id, peer, target);

    let mut stats = relay(stream, upstream, &config.relay).await;
    stats.client_to_upstream += early.len() as u64;
    session.close(&stats);

    info!(
        "[{}] {} -> {} closed: sent={} received={} end={}",
        session.id, peer, target, session.bytes_sent, session.bytes_received, stats.end
    );
    debug!(
        "[{}] {}",
        session.id,
        serde_json::to_string(&session).unwrap_or_default()
    );

    Ok(())
}

async fn reply(stream: &mut TcpStream, reply: PreambleReply) -> Result<()> {
    stream.write_all(reply.encode().as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Short reason sent back in an `ERR` reply
fn reject_reason(err: &TunnelError) -> &'static str {
    match err {
        TunnelError::Resolve { .. } => "unresolvable host",
        TunnelError::ConnectTimeout(_) => "connect timeout",
        TunnelError::UpstreamConnect { .. } => "connection refused",
        _ => "bad gateway",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tunnelgate_common::protocol::encode_preamble;
    use tunnelgate_common::{RelayConfig, Target};

    async fn echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
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

    fn bridge_config(destination: Destination) -> BridgeConfig {
        BridgeConfig {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 0,
            destination,
            relay: RelayConfig::with_idle_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }

    async fn read_line(stream: &mut TcpStream) -> String {
        let mut line = Vec::new();
        loop {
            let byte = timeout(Duration::from_secs(5), stream.read_u8())
                .await
                .unwrap()
                .unwrap();
            line.push(byte);
            if byte == b'\n' {
                return String::from_utf8(line).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_static_destination_relays_raw_bytes() {
        let port = echo_server().await;
        let bridge = start(bridge_config(Destination::Static(Target::new("127.0.0.1", port))))
            .await
            .unwrap();

        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        // No preamble expected: the first line is payload
        let payload = b"TUNNELGATE/1 not-a-preamble\r\n";
        stream.write_all(payload).await.unwrap();
        let mut buf = vec![0u8; payload.len()];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, payload);
    }

    #[tokio::test]
    async fn test_static_destination_down_closes_session() {
        let bridge = start(bridge_config(Destination::Static(Target::new(
            "127.0.0.1",
            dead_port().await,
        ))))
        .await
        .unwrap();

        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        let mut buf = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_preamble_destination() {
        let port = echo_server().await;
        let bridge = start(bridge_config(Destination::Preamble)).await.unwrap();

        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        stream
            .write_all(encode_preamble(&Target::new("127.0.0.1", port)).as_bytes())
            .await
            .unwrap();
        assert_eq!(read_line(&mut stream).await, "OK\r\n");

        stream.write_all(b"payload").await.unwrap();
        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[tokio::test]
    async fn test_preamble_with_early_payload() {
        let port = echo_server().await;
        let bridge = start(bridge_config(Destination::Preamble)).await.unwrap();

        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        let mut first = encode_preamble(&Target::new("127.0.0.1", port)).into_bytes();
        first.extend_from_slice(b"early");
        stream.write_all(&first).await.unwrap();

        assert_eq!(read_line(&mut stream).await, "OK\r\n");
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"early");
    }

    #[tokio::test]
    async fn test_preamble_unreachable_target_gets_err() {
        let bridge = start(bridge_config(Destination::Preamble)).await.unwrap();

        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        stream
            .write_all(encode_preamble(&Target::new("127.0.0.1", dead_port().await)).as_bytes())
            .await
            .unwrap();

        assert_eq!(read_line(&mut stream).await, "ERR connection refused\r\n");
    }

    #[tokio::test]
    async fn test_silent_peer_closed_after_idle_timeout() {
        let mut config = bridge_config(Destination::Preamble);
        config.relay = RelayConfig {
            idle_timeout: Some(Duration::from_millis(200)),
            ..RelayConfig::default()
        };
        let bridge = start(config).await.unwrap();

        // Connects through the tunnel but never announces a target
        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        let mut buf = Vec::new();
        timeout(Duration::from_secs(3), stream.read_to_end(&mut buf))
            .await
            .expect("silent session was not closed")
            .unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_garbled_preamble_gets_err() {
        let bridge = start(bridge_config(Destination::Preamble)).await.unwrap();

        let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        assert_eq!(read_line(&mut stream).await, "ERR invalid preamble\r\n");
    }

    #[test]
    fn test_reject_reasons() {
        assert_eq!(
            reject_reason(&TunnelError::ConnectTimeout("a:1".into())),
            "connect timeout"
        );
        assert_eq!(
            reject_reason(&TunnelError::Resolve {
                host: "nx.example".into(),
                reason: "no addresses".into()
            }),
            "unresolvable host"
        );
    }
}
