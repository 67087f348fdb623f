use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tunnelgate_proxy::{Args, Config, TunnelClient, start};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("tunnelgate proxy v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(args)?;
    for pattern in config.allow_list.patterns() {
        info!("Tunnelled: {}", pattern);
    }

    // Standalone tunnel client next to the proxy
    let client = match (config.client_port, &config.tunnel) {
        (Some(port), Some(tunnel)) => {
            let client = TunnelClient::new(tunnel.host.as_str(), tunnel.port, config.connect_timeout);
            Some(
                client
                    .listen((config.listen_host.as_str(), port), config.relay)
                    .await?,
            )
        }
        _ => None,
    };

    let proxy = start(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down gracefully...");
    proxy.shutdown();
    if let Some(client) = client {
        client.shutdown();
    }

    Ok(())
}
