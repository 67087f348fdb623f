use thiserror::Error;

/// Error types for the tunnelgate proxy and bridge
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("Failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("Upstream connection failed to {target}: {reason}")]
    UpstreamConnect { target: String, reason: String },

    #[error("Tunnel unavailable at {addr}: {reason}")]
    TunnelUnavailable { addr: String, reason: String },

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Tunnel preamble rejected: {0}")]
    PreambleRejected(String),

    #[error("Invalid preamble: {0}")]
    InvalidPreamble(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
