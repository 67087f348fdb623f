//! Bidirectional byte relay
//!
//! Copies bytes between two duplex streams until one direction ends, an
//! error occurs, or no byte has moved in either direction for the idle
//! interval. When any of those happens both write halves are shut down and
//! both streams are dropped, so closing one leg closes the other. The
//! client-to-upstream direction can pass through a filter.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

use crate::constants::{DEFAULT_IDLE_TIMEOUT_SECS, RELAY_BUFFER_SIZE};

/// Relay tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Tear the relay down after this long without traffic; `None` disables
    pub idle_timeout: Option<Duration>,

    /// Per-direction chunk size
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            buffer_size: RELAY_BUFFER_SIZE,
        }
    }
}

impl RelayConfig {
    /// Build a config from an idle timeout in seconds, `0` meaning disabled
    pub fn with_idle_secs(idle_timeout_secs: u64) -> Self {
        Self {
            idle_timeout: (idle_timeout_secs > 0).then(|| Duration::from_secs(idle_timeout_secs)),
            ..Self::default()
        }
    }
}

/// Why a relay stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayEnd {
    /// The first stream reached end-of-stream
    ClientClosed,
    /// The second stream reached end-of-stream
    UpstreamClosed,
    /// Nothing moved for the idle interval
    IdleTimeout,
    /// A read or write failed on either leg
    Error(String),
}

impl fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEnd::ClientClosed => f.write_str("client closed"),
            RelayEnd::UpstreamClosed => f.write_str("upstream closed"),
            RelayEnd::IdleTimeout => f.write_str("idle timeout"),
            RelayEnd::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// Outcome of a finished relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Bytes copied from the first stream to the second
    pub client_to_upstream: u64,
    /// Bytes copied from the second stream to the first
    pub upstream_to_client: u64,
    pub end: RelayEnd,
}

/// Last moment any byte moved, shared by both directions of one relay
struct Activity {
    start: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.start + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}

/// Relay bytes between `client` and `upstream` until either side finishes
///
/// Returns the byte counts per direction and the reason the relay ended.
/// Both streams are shut down for writing and dropped before returning.
pub async fn relay<A, B>(client: A, upstream: B, config: &RelayConfig) -> RelayStats
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    run(client, upstream, config, None::<fn(&[u8], &mut Vec<u8>) -> bool>).await
}

/// Like [`relay`], but client bytes pass through `filter` on their way up
///
/// `filter` appends what may reach the upstream to its output buffer and
/// returns `false` once the client leg should end, which ends the relay as
/// if the client had closed.
pub async fn relay_filtered<A, B, F>(
    client: A,
    upstream: B,
    config: &RelayConfig,
    filter: F,
) -> RelayStats
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
    F: FnMut(&[u8], &mut Vec<u8>) -> bool,
{
    run(client, upstream, config, Some(filter)).await
}

async fn run<A, B, F>(client: A, upstream: B, config: &RelayConfig, filter: Option<F>) -> RelayStats
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
    F: FnMut(&[u8], &mut Vec<u8>) -> bool,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let activity = Activity::new();
    let sent = AtomicU64::new(0);
    let received = AtomicU64::new(0);
    let buffer_size = config.buffer_size.max(1);

    let end = tokio::select! {
        result = pump(&mut client_read, &mut upstream_write, &sent, &activity, buffer_size, filter) => {
            match result {
                Ok(()) => RelayEnd::ClientClosed,
                Err(e) => RelayEnd::Error(e.to_string()),
            }
        }
        result = pump(&mut upstream_read, &mut client_write, &received, &activity, buffer_size, None::<fn(&[u8], &mut Vec<u8>) -> bool>) => {
            match result {
                Ok(()) => RelayEnd::UpstreamClosed,
                Err(e) => RelayEnd::Error(e.to_string()),
            }
        }
        _ = idle_watchdog(&activity, config.idle_timeout) => RelayEnd::IdleTimeout,
    };

    // Propagate the close to both peers before the halves are dropped
    if let Err(e) = upstream_write.shutdown().await {
        debug!("Upstream shutdown after relay: {}", e);
    }
    if let Err(e) = client_write.shutdown().await {
        debug!("Client shutdown after relay: {}", e);
    }

    RelayStats {
        client_to_upstream: sent.load(Ordering::Relaxed),
        upstream_to_client: received.load(Ordering::Relaxed),
        end,
    }
}

/// Await `fut` for at most the idle interval
///
/// Covers the phases before a relay exists (waiting for a request head or a
/// preamble). Returns `None` when `idle` elapsed first; with no idle timeout
/// configured `fut` is awaited to completion.
pub async fn within_idle<F: Future>(idle: Option<Duration>, fut: F) -> Option<F::Output> {
    match idle {
        Some(idle) => tokio::time::timeout(idle, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Copy one direction until end-of-stream or until `filter` ends it
async fn pump<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    counter: &AtomicU64,
    activity: &Activity,
    buffer_size: usize,
    mut filter: Option<F>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(&[u8], &mut Vec<u8>) -> bool,
{
    let mut buf = vec![0u8; buffer_size];
    let mut filtered = Vec::new();
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        activity.touch();

        let (chunk, open) = match filter.as_mut() {
            Some(filter) => {
                filtered.clear();
                let open = filter(&buf[..n], &mut filtered);
                (filtered.as_slice(), open)
            }
            None => (&buf[..n], true),
        };

        if !chunk.is_empty() {
            writer.write_all(chunk).await?;
            writer.flush().await?;
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            activity.touch();
        }
        if !open {
            return Ok(());
        }
    }
}

/// Resolve once no byte has moved for `idle`; never resolves when `idle` is `None`
async fn idle_watchdog(activity: &Activity, idle: Option<Duration>) {
    let Some(idle) = idle else {
        return std::future::pending().await;
    };

    loop {
        let deadline = activity.last() + idle;
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep_until(deadline).await;
    }
}
