//! Common types and engines for the tunnelgate proxy
//!
//! This crate holds everything shared by the proxy listener (`tgp`) and the
//! tunnel bridge (`tgb`): the domain classifier, the byte relay, the request
//! head parser, the tunnel preamble and the error type both binaries report.

pub mod classifier;
pub mod constants;
pub mod dial;
pub mod error;
pub mod models;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use classifier::DomainAllowList;
pub use dial::dial;
pub use error::{Result, TunnelError};
pub use models::{ProxyConnection, Route, SessionState, Target, TunnelSession};
pub use protocol::{
    BodyFramer, BodyFraming, CONNECTION_ESTABLISHED, IncomingRequest, PreambleReply, RequestHead,
    accept_preamble, read_request_head, request_preamble, status_response,
};
pub use relay::{RelayConfig, RelayEnd, RelayStats, relay, relay_filtered, within_idle};
pub use server::{ListenerHandle, bind, serve};
pub use utils::generate_session_id;
