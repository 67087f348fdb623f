use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;
use tunnelgate_common::{Result, Target, dial};

/// Open a new outbound connection straight to `target`
pub async fn open_direct(target: &Target, connect_timeout: Duration) -> Result<TcpStream> {
    let stream = dial(target, connect_timeout).await?;
    if let Ok(addr) = stream.peer_addr() {
        debug!("Direct connection to {} ({})", target, addr);
    }
    Ok(stream)
}
