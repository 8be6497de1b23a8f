use std::future::Future;
use std::io;

use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info};

use super::{InactiveReason, ProbeResult};
use crate::decoder::Endpoint;
use crate::util::resolve_host;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug)]
pub(crate) enum ConnectError {
    Resolve(io::Error),
    Connect(io::Error),
}

/// Open one TCP connection to `endpoint` and time it.
///
/// Name resolution and connect share a single deadline of `timeout_ms`.
/// The connection is closed as soon as it is established; nothing is sent.
pub async fn probe_tcp(endpoint: &Endpoint, timeout_ms: u64) -> ProbeResult {
    let result = settle(connect(endpoint), Duration::from_millis(timeout_ms)).await;
    match result {
        ProbeResult::Active { latency_ms } => {
            debug!(endpoint = %endpoint, latency_ms, "tcp connect succeeded");
        }
        ProbeResult::Inactive { reason } => {
            info!(endpoint = %endpoint, reason = %reason, "tcp connect did not complete");
        }
    }
    result
}

async fn connect(endpoint: &Endpoint) -> Result<TcpStream, ConnectError> {
    let addrs = resolve_host(&endpoint.host, endpoint.port)
        .await
        .map_err(ConnectError::Resolve)?;
    TcpStream::connect(&addrs[..])
        .await
        .map_err(ConnectError::Connect)
}

/// Race `attempt` against `limit`. Whichever finishes first decides the
/// outcome; the loser is dropped along with any socket it holds.
pub(crate) async fn settle<F>(attempt: F, limit: Duration) -> ProbeResult
where
    F: Future<Output = Result<TcpStream, ConnectError>>,
{
    let start = Instant::now();
    match timeout(limit, attempt).await {
        Ok(Ok(conn)) => {
            let elapsed = start.elapsed();
            drop(conn);
            ProbeResult::Active {
                latency_ms: round_millis(elapsed),
            }
        }
        Ok(Err(e)) => ProbeResult::Inactive {
            reason: classify(&e),
        },
        Err(_) => ProbeResult::Inactive {
            reason: InactiveReason::Timeout,
        },
    }
}

pub(crate) fn classify(err: &ConnectError) -> InactiveReason {
    match err {
        ConnectError::Resolve(e) => {
            debug!("name resolution failed: {}", e);
            InactiveReason::HostNotFound
        }
        ConnectError::Connect(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            InactiveReason::ConnectionRefused
        }
        ConnectError::Connect(e) => {
            debug!("connect failed: {}", e);
            InactiveReason::ConnectionFailed
        }
    }
}

fn round_millis(elapsed: Duration) -> u64 {
    ((elapsed.as_micros() + 500) / 1000) as u64
}
