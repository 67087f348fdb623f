//! Selective forward proxy
//!
//! Accepts HTTP proxy connections (plain requests and CONNECT), classifies
//! each target host against the allow-list and relays the connection either
//! straight to the target or through the tunnel transport.

use std::sync::Arc;
use tracing::info;
use tunnelgate_common::{ListenerHandle, Result, bind, serve};

pub mod config;
pub mod error_handling;
pub mod handlers;
pub mod transport;
pub mod tunnel;

pub use config::{Args, Config, TunnelConfig, TunnelMode};
pub use transport::TunnelTransport;
pub use tunnel::TunnelClient;

/// Read-only state shared by every connection task
pub struct ProxyState {
    pub config: Config,

    /// Backs TUNNEL-routed connections; `None` when no tunnel is configured
    pub transport: Option<Box<dyn TunnelTransport>>,
}

impl ProxyState {
    pub fn new(config: Config) -> Self {
        let transport = config
            .tunnel
            .as_ref()
            .map(|tunnel| transport::from_config(tunnel, config.connect_timeout));
        Self { config, transport }
    }
}

/// Bind the proxy listener and start accepting connections
pub async fn start(config: Config) -> Result<ListenerHandle> {
    let listener = bind(&config.listen_host, config.listen_port).await?;
    let state = Arc::new(ProxyState::new(config));

    match &state.transport {
        Some(transport) => info!(
            "Tunnelling {} allow-listed pattern(s) via {}",
            state.config.allow_list.len(),
            transport.describe()
        ),
        None => info!("No tunnel configured, all traffic goes direct"),
    }

    let handle = serve(listener, "proxy", move |stream, peer| {
        let state = Arc::clone(&state);
        async move { handlers::handle_connection(stream, peer, &state).await }
    })?;
    info!("Proxy listening on {}", handle.addr);

    Ok(handle)
}
