//! Outbound TCP dialing with a bounded connect time

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, TunnelError};
use crate::models::Target;

/// Resolve `target` and connect to the first address that accepts
///
/// Each address gets the full `connect_timeout`. Fails with `Resolve` when
/// the name yields no address, `ConnectTimeout` when every attempt timed
/// out, and `UpstreamConnect` otherwise.
pub async fn dial(target: &Target, connect_timeout: Duration) -> Result<TcpStream> {
    let addrs = resolve(target, connect_timeout).await?;
    connect_to_resolved(&addrs, target, connect_timeout).await
}

async fn resolve(target: &Target, connect_timeout: Duration) -> Result<Vec<SocketAddr>> {
    let lookup = lookup_host((target.host.as_str(), target.port));
    let addrs: Vec<SocketAddr> = match timeout(connect_timeout, lookup).await {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(e)) => {
            return Err(TunnelError::Resolve {
                host: target.host.clone(),
                reason: e.to_string(),
            });
        }
        Err(_) => return Err(TunnelError::ConnectTimeout(target.to_string())),
    };

    if addrs.is_empty() {
        return Err(TunnelError::Resolve {
            host: target.host.clone(),
            reason: "no addresses".to_string(),
        });
    }
    Ok(addrs)
}

async fn connect_to_resolved(
    addrs: &[SocketAddr],
    target: &Target,
    connect_timeout: Duration,
) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                // Interactive traffic, small writes
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Setting TCP_NODELAY on {} failed: {}", addr, e);
                }
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_err = Some(e.to_string());
            }
            Err(_) => {
                debug!("Connect to {} timed out", addr);
            }
        }
    }

    match last_err {
        Some(reason) => Err(TunnelError::UpstreamConnect {
            target: target.to_string(),
            reason,
        }),
        None => Err(TunnelError::ConnectTimeout(target.to_string())),
    }
}
