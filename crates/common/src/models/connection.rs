use serde::Serialize;
use std::net::SocketAddr;

use super::{Route, Target};
use crate::utils::generate_session_id;

/// One client-to-target session handled by the proxy listener
///
/// Created once the request head has been classified. The route is fixed
/// for the lifetime of the connection.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyConnection {
    /// Short id prefixed to every log line of this connection
    pub id: String,

    /// Address of the proxy client
    pub peer: SocketAddr,

    /// Transport chosen by the classifier
    pub route: Route,

    /// Requested destination
    pub target: Target,

    /// `true` for CONNECT tunnels, `false` for plain HTTP forwarding
    pub is_connect: bool,
}

impl ProxyConnection {
    /// Create a new proxied connection record
    pub fn new(peer: SocketAddr, route: Route, target: Target, is_connect: bool) -> Self {
        Self {
            id: generate_session_id(),
            peer,
            route,
            target,
            is_connect,
        }
    }

    /// Short label for log lines, e.g. `CONNECT hot.net.il:443 via tunnel`
    pub fn describe(&self) -> String {
        let kind = if self.is_connect { "CONNECT" } else { "HTTP" };
        format!("{} {} via {}", kind, self.target, self.route)
    }
}
