use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::Target;
use crate::relay::{RelayEnd, RelayStats};
use crate::utils::generate_session_id;

/// Lifecycle state of a tunnel session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Closed,
}

/// One logical stream across the forwarded port
///
/// Each session is backed by its own TCP connection; multiplexing over the
/// single forwarded port is left to SSH. The byte counters are only filled
/// in when the session closes.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelSession {
    /// Short ephemeral id used to correlate log lines on both hosts
    pub id: String,

    /// Destination announced for this session, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    pub state: SessionState,

    /// Bytes carried from the side that opened the session towards its destination
    pub bytes_sent: u64,

    /// Bytes carried back
    pub bytes_received: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<RelayEnd>,

    #[serde(skip)]
    opened_at: Option<Instant>,
}

impl TunnelSession {
    /// Start tracking a freshly opened session
    pub fn open(target: Option<Target>) -> Self {
        Self {
            id: generate_session_id(),
            target,
            state: SessionState::Open,
            bytes_sent: 0,
            bytes_received: 0,
            end: None,
            opened_at: Some(Instant::now()),
        }
    }

    /// Mark the session closed with the counters of its relay
    ///
    /// `stats` must come from a relay whose first stream faces the side that
    /// opened the session.
    pub fn close(&mut self, stats: &RelayStats) {
        self.state = SessionState::Closed;
        self.bytes_sent = stats.client_to_upstream;
        self.bytes_received = stats.upstream_to_client;
        self.end = Some(stats.end.clone());
    }

    /// Whether the session is still carrying traffic
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Time since the session was opened
    pub fn elapsed(&self) -> Duration {
        self.opened_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}
