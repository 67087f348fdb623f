//! Proxy configuration
//!
//! Command line arguments (with environment fallbacks) and an optional JSON
//! file are merged once at start up into an immutable [`Config`] that is
//! passed to every component.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tunnelgate_common::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS};
use tunnelgate_common::{DomainAllowList, RelayConfig};

/// CLI arguments for the proxy
#[derive(Parser, Debug)]
#[command(name = "tgp")]
#[command(
    about = "Selective forward proxy: allow-listed hosts go through the tunnel, everything else direct",
    long_about = None
)]
#[command(version)]
pub struct Args {
    /// Local port the proxy listens on
    #[arg(short, long, env = "TGP_LISTEN_PORT")]
    pub listen_port: u16,

    /// Local address the proxy listens on
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_host: String,

    /// Local end of the forwarded tunnel port
    #[arg(short, long, env = "TGP_TUNNEL_PORT")]
    pub tunnel_port: Option<u16>,

    /// Host of the tunnel port
    #[arg(long, default_value = "127.0.0.1")]
    pub tunnel_host: String,

    /// How the tunnel port is reached
    #[arg(long, value_enum, default_value_t = TunnelMode::Forwarded)]
    pub tunnel_mode: TunnelMode,

    /// Announce each session's target to the bridge
    #[arg(long)]
    pub preamble: bool,

    /// Host routed through the tunnel (`host` or `*.suffix`), repeatable
    #[arg(short = 'd', long = "domain", env = "TGP_DOMAINS", value_delimiter = ',')]
    pub domains: Vec<String>,

    /// JSON file with `domains` and `idle_timeout_secs`
    #[arg(short, long, env = "TGP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds without traffic before a connection is closed, 0 disables [default: 60]
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Outbound connect timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Also accept raw connections on this port and pipe them into the tunnel
    #[arg(long)]
    pub client_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// How tunnel sessions reach the far side
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TunnelMode {
    /// Through an SSH-forwarded port to a bridge
    Forwarded,
    /// Straight to a fixed local upstream, e.g. an inspection proxy
    Fixed,
}

/// Optional settings file
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub domains: Vec<String>,
    pub idle_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Where the tunnel port is and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub host: String,
    pub port: u16,
    pub mode: TunnelMode,

    /// Send the target preamble on every session
    pub preamble: bool,
}

/// Configuration for the proxy
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,

    /// Hosts routed through the tunnel
    pub allow_list: DomainAllowList,

    /// `None` when nothing is ever tunnelled
    pub tunnel: Option<TunnelConfig>,

    pub relay: RelayConfig,

    /// Bound on every outbound dial
    pub connect_timeout: Duration,

    /// Port of the standalone tunnel client listener
    pub client_port: Option<u16>,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        // CLI entries first, then the file's
        let allow_list = DomainAllowList::new(args.domains.iter().chain(file.domains.iter()))
            .context("Invalid allow-list")?;

        let tunnel = args.tunnel_port.map(|port| TunnelConfig {
            host: args.tunnel_host.clone(),
            port,
            mode: args.tunnel_mode,
            preamble: args.preamble,
        });

        if tunnel.is_none() {
            if !allow_list.is_empty() {
                bail!("--tunnel-port is required when domains are configured");
            }
            if args.client_port.is_some() {
                bail!("--client-port requires --tunnel-port");
            }
        }
        if args.preamble && args.tunnel_mode == TunnelMode::Fixed {
            bail!("--preamble only applies to --tunnel-mode forwarded");
        }
        if args.connect_timeout == 0 {
            bail!("--connect-timeout must be at least one second");
        }

        let idle_secs = args
            .idle_timeout
            .or(file.idle_timeout_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);

        Ok(Self {
            listen_host: args.listen_host,
            listen_port: args.listen_port,
            allow_list,
            tunnel,
            relay: RelayConfig::with_idle_secs(idle_secs),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            client_port: args.client_port,
        })
    }
}
