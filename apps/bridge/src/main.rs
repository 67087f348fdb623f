use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tunnelgate_bridge::{Args, BridgeConfig, start};

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

    info!("tunnelgate bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = BridgeConfig::from_args(args)?;
    let bridge = start(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down gracefully...");
    bridge.shutdown();

    Ok(())
}
