use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tunnelgate_common::{
    CONNECTION_ESTABLISHED, IncomingRequest, RelayConfig, RelayStats, Result, relay,
};

/// Complete a CONNECT whose upstream is already open
///
/// The tunnel is opaque: TLS is never terminated and bytes flow unmodified
/// in both directions until either side closes.
pub async fn handle_connect(
    mut client: TcpStream,
    mut upstream: TcpStream,
    incoming: &IncomingRequest,
    relay_config: &RelayConfig,
) -> Result<RelayStats> {
    client.write_all(CONNECTION_ESTABLISHED).await?;

    // Bytes pipelined behind the CONNECT head, typically a TLS ClientHello
    let early = incoming.leftover();
    if !early.is_empty() {
        upstream.write_all(early).await?;
    }

    let mut stats = relay(client, upstream, relay_config).await;
    stats.client_to_upstream += early.len() as u64;
    Ok(stats)
}
