use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tunnelgate_common::{
    BodyFraming, IncomingRequest, RelayConfig, RelayStats, Result, Target, relay_filtered,
};

use super::gate::RequestGate;

/// Forward a plain HTTP request over an already open upstream
///
/// The request head goes out exactly as received (no header is added,
/// removed or reordered), followed by whatever body bytes arrived with it.
/// The response is relayed back byte-for-byte. Later requests on the same
/// connection reach the upstream only while they name the same `target`.
pub async fn handle_forwarding(
    client: TcpStream,
    mut upstream: TcpStream,
    incoming: &IncomingRequest,
    target: &Target,
    framing: BodyFraming,
    relay_config: &RelayConfig,
) -> Result<RelayStats> {
    let mut gate = RequestGate::new(target.clone(), framing);
    let mut first = incoming.head_bytes().to_vec();
    gate.feed(incoming.leftover(), &mut first);
    upstream.write_all(&first).await?;

    let mut stats = relay_filtered(client, upstream, relay_config, move |input, out| {
        gate.feed(input, out);
        !gate.is_closed()
    })
    .await;
    stats.client_to_upstream += first.len() as u64;
    Ok(stats)
}
