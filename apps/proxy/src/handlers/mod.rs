//! Connection handlers
//!
//! One task per accepted client runs [`handle_connection`]: read the request
//! head, classify the target, open exactly one upstream for the chosen route
//! and hand both sockets to the relay. Nothing here is retried and a TUNNEL
//! decision never falls back to DIRECT. A client that does not finish its
//! request head within the idle timeout is dropped.

pub mod connect;
pub mod direct;
pub mod forwarding;
pub mod gate;


pub use connect::handle_connect;
pub use direct::open_direct;
pub use forwarding::handle_forwarding;

use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use tunnelgate_common::{
    BodyFraming, ProxyConnection, Result, Route, TunnelError, TunnelSession, read_request_head,
    within_idle,
};

use crate::ProxyState;
use crate::error_handling::{error_response, is_client_error};

/// Serve one proxy client from request head to relay teardown
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: &ProxyState,
) -> Result<()> {
    let idle = state.config.relay.idle_timeout;
    let incoming = match within_idle(idle, read_request_head(&mut stream)).await {
        Some(Ok(Some(incoming))) => incoming,
        Some(Ok(None)) => {
            debug!("{} closed without sending a request", peer);
            return Ok(());
        }
        Some(Err(e)) => return reject(stream, peer, &e).await,
        None => {
            debug!("{} sent no complete request in time, closing", peer);
            return Ok(());
        }
    };

    let target = match incoming.head.resolve_target() {
        Ok(target) => target,
        Err(e) => return reject(stream, peer, &e).await,
    };
    let framing = if incoming.head.is_connect() {
        BodyFraming::Length(0)
    } else {
        match incoming.head.body_framing() {
            Ok(framing) => framing,
            Err(e) => return reject(stream, peer, &e).await,
        }
    };

    let route = state.config.allow_list.classify(&target.host);
    let conn = ProxyConnection::new(peer, route, target, incoming.head.is_connect());
    debug!("[{}] {} for {}", conn.id, conn.describe(), peer);

    let (upstream, session) = match open_upstream(&conn, state).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!("[{}] {} failed: {}", conn.id, conn.describe(), e);
            return reject(stream, peer, &e).await;
        }
    };

    let stats = if conn.is_connect {
        handle_connect(stream, upstream, &incoming, &state.config.relay).await?
    } else {
        handle_forwarding(
            stream,
            upstream,
            &incoming,
            &conn.target,
            framing,
            &state.config.relay,
        )
        .await?
    };

    let session_id = session.as_ref().map_or("-", |s| s.id.as_str());
    info!(
        "[{}] {} closed: session={} sent={} received={} end={}",
        conn.id,
        conn.describe(),
        session_id,
        stats.client_to_upstream,
        stats.upstream_to_client,
        stats.end
    );

    if let Some(mut session) = session {
        session.close(&stats);
        debug!(
            "[{}] {}",
            conn.id,
            serde_json::to_string(&session).unwrap_or_default()
        );
    }

    Ok(())
}

/// Open the single upstream backing `conn`
async fn open_upstream(
    conn: &ProxyConnection,
    state: &ProxyState,
) -> Result<(TcpStream, Option<TunnelSession>)> {
    match conn.route {
        Route::Direct => {
            let stream = open_direct(&conn.target, state.config.connect_timeout).await?;
            Ok((stream, None))
        }
        Route::Tunnel => {
            let Some(transport) = state.transport.as_deref() else {
                return Err(TunnelError::TunnelUnavailable {
                    addr: "-".to_string(),
                    reason: "no tunnel configured".to_string(),
                });
            };
            let (stream, session) = transport.open(&conn.target).await?;
            Ok((stream, Some(session)))
        }
    }
}

/// Answer a failed request with its status response and close
async fn reject(mut stream: TcpStream, peer: SocketAddr, err: &TunnelError) -> Result<()> {
    if is_client_error(err) {
        debug!("Rejecting request from {}: {}", peer, err);
    }

    stream.write_all(&error_response(err)).await?;
    stream.shutdown().await?;
    Ok(())
}
