//! Listener lifecycle
//!
//! The proxy, the standalone tunnel client and the bridge all run the same
//! loop: accept, spawn one task per connection, stop on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, TunnelError};

/// Handle to a running listener
///
/// Call [`ListenerHandle::shutdown`] or drop the handle to stop accepting
/// connections. Connections already accepted run to completion.
#[derive(Debug)]
pub struct ListenerHandle {
    /// Address the listener is bound to
    pub addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl ListenerHandle {
    /// Stop accepting new connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Bind a TCP listener on `host:port`
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let bind_error = |source| TunnelError::Bind {
        addr: format!("{}:{}", host, port),
        source,
    };
    let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
    Ok(listener)
}

/// Run `handler` for every connection accepted on `listener`
///
/// Each connection gets its own task. `name` labels the log lines.
pub fn serve<H, F>(listener: TcpListener, name: &'static str, handler: H) -> Result<ListenerHandle>
where
    H: Fn(TcpStream, SocketAddr) -> F + Send + Sync + 'static,
    F: Future<Output = Result<()>> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(accept_loop(listener, name, handler, shutdown_rx));

    Ok(ListenerHandle { addr, shutdown_tx })
}

async fn accept_loop<H, F>(
    listener: TcpListener,
    name: &'static str,
    handler: H,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    H: Fn(TcpStream, SocketAddr) -> F + Send + Sync + 'static,
    F: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("{}: accepted connection from {}", name, peer);
                        let connection = handler(stream, peer);
                        tokio::spawn(async move {
                            if let Err(e) = connection.await {
                                warn!("{}: connection from {} failed: {}", name, peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("{}: accept error: {}", name, e),
                }
            }
            changed = shutdown_rx.changed() => {
                // A dropped handle counts as shutdown
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("{}: shutting down", name);
                    return;
                }
            }
        }
    }
}
