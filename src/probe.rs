//! TCP readiness probing.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::ProbeSettings;

/// Waits until `port` accepts a connection on the IPv4 or IPv6 loopback,
/// giving up once `timeout` has elapsed. Refused or timed-out attempts just
/// mean the server is not up yet. The last attempt lands on the deadline.
pub async fn wait_for_port(port: u16, timeout: Duration, settings: ProbeSettings) -> bool {
    let end = Instant::now() + timeout;
    loop {
        let remaining = end.saturating_duration_since(Instant::now());
        let attempt = settings.attempt_timeout.min(remaining.max(Duration::from_millis(1)));
        if connect_loopback(port, attempt).await {
            tracing::debug!(port, "port accepted a connection");
            return true;
        }
        let now = Instant::now();
        if now >= end {
            tracing::debug!(port, ?timeout, "gave up waiting for port");
            return false;
        }
        tokio::time::sleep(settings.retry_interval.min(end - now)).await;
    }
}

/// Dev servers bind `localhost`, which may resolve to either family.
async fn connect_loopback(port: u16, limit: Duration) -> bool {
    let v4 = tokio::time::timeout(limit, TcpStream::connect((Ipv4Addr::LOCALHOST, port)));
    let v6 = tokio::time::timeout(limit, TcpStream::connect((Ipv6Addr::LOCALHOST, port)));
    tokio::pin!(v4, v6);
    let (mut v4_done, mut v6_done) = (false, false);
    while !(v4_done && v6_done) {
        tokio::select! {
            result = &mut v4, if !v4_done => {
                if matches!(result, Ok(Ok(_))) {
                    return true;
                }
                v4_done = true;
            }
            result = &mut v6, if !v6_done => {
                if matches!(result, Ok(Ok(_))) {
                    return true;
                }
                v6_done = true;
            }
        }
    }
    false
}
