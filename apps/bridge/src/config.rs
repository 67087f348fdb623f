use anyhow::{Context, Result, bail};
use clap::Parser;
use std::time::Duration;
use tunnelgate_common::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_TUNNEL_PORT,
};
use tunnelgate_common::{RelayConfig, Target};

/// CLI arguments for the bridge
#[derive(Parser, Debug)]
#[command(name = "tgb")]
#[command(about = "Tunnel bridge: relays sessions arriving on the forwarded port", long_about = None)]
#[command(version)]
pub struct Args {
    /// Far end of the forwarded port
    #[arg(short, long, env = "TGB_LISTEN_PORT", default_value_t = DEFAULT_TUNNEL_PORT)]
    pub listen_port: u16,

    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_host: String,

    /// Send every session to this `host:port`
    #[arg(
        short,
        long,
        env = "TGB_DESTINATION",
        conflicts_with = "preamble",
        required_unless_present = "preamble"
    )]
    pub destination: Option<String>,

    /// Read each session's destination from its preamble
    #[arg(long)]
    pub preamble: bool,

    /// Seconds without traffic before a session is closed, 0 disables
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout: u64,

    /// Destination connect timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where a session is relayed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Always the same address, e.g. an inspection proxy
    Static(Target),
    /// Named by the session's preamble
    Preamble,
}

impl Destination {
    pub fn is_preamble(&self) -> bool {
        matches!(self, Destination::Preamble)
    }
}

/// Configuration for the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub destination: Destination,
    pub relay: RelayConfig,
    pub connect_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let destination = match (args.destination, args.preamble) {
            (Some(dest), false) => {
                // Port 0 marks a missing port, an explicit 0 is rejected by the parser
                let target = Target::parse_authority(&dest, 0)
                    .with_context(|| format!("Invalid destination {}", dest))?;
                if target.port == 0 {
                    bail!("--destination needs an explicit port: {}", dest);
                }
                Destination::Static(target)
            }
            (None, true) => Destination::Preamble,
            _ => bail!("exactly one of --destination and --preamble is required"),
        };

        if args.connect_timeout == 0 {
            bail!("--connect-timeout must be at least one second");
        }

        Ok(Self {
            listen_host: args.listen_host,
            listen_port: args.listen_port,
            destination,
            relay: RelayConfig::with_idle_secs(args.idle_timeout),
            connect_timeout: Duration::from_secs(args.connect_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<BridgeConfig> {
        let mut argv = vec!["tgb"];
        argv.extend_from_slice(args);
        BridgeConfig::from_args(Args::try_parse_from(argv)?)
    }

    #[test]
    fn test_static_destination() {
        let config = parse(&["-d", "127.0.0.1:8080"]).unwrap();

        assert_eq!(config.listen_port, DEFAULT_TUNNEL_PORT);
        assert_eq!(config.listen_host, "127.0.0.1");
        assert_eq!(
            config.destination,
            Destination::Static(Target::new("127.0.0.1", 8080))
        );
        assert_eq!(config.relay.idle_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_preamble_destination() {
        let config = parse(&["-l", "9000", "--preamble", "--idle-timeout", "0"]).unwrap();

        assert_eq!(config.listen_port, 9000);
        assert!(config.destination.is_preamble());
        assert_eq!(config.relay.idle_timeout, None);
    }

    #[test]
    fn test_destination_and_preamble_are_exclusive() {
        assert!(parse(&["-d", "127.0.0.1:8080", "--preamble"]).is_err());
        assert!(parse(&["-l", "9000"]).is_err());
    }

    #[test]
    fn test_destination_requires_port() {
        let err = parse(&["-d", "inspector.local"]).unwrap_err();
        assert!(err.to_string().contains("explicit port"));

        assert!(parse(&["-d", "inspector.local:0"]).is_err());
        assert!(parse(&["-d", "[::1]:8080"]).is_ok());
    }
}
