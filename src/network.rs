//! # Network Module
//!
//! Point-in-time link liveness check.
//!
//! The sync controller asks once per cycle. The answer is a snapshot: if
//! the link drops right after, the cycle carries on with the stale answer.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Best-effort link state query
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Whether the network looks reachable right now
    async fn is_network_alive(&self) -> bool;
}

/// Reports the link alive when a TCP connection to a known host succeeds
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// # Arguments
    ///
    /// * `host` - Host name or address to connect to
    /// * `port` - TCP port on that host
    /// * `timeout` - Longest time to wait for the connection
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn is_network_alive(&self) -> bool {
        let target = (self.host.as_str(), self.port);
        match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_)) => {
                debug!("Network alive ({}:{} reachable)", self.host, self.port);
                true
            }
            Ok(Err(e)) => {
                debug!("Network down ({}:{}: {})", self.host, self.port, e);
                false
            }
            Err(_) => {
                debug!(
                    "Network down ({}:{} timed out after {:?})",
                    self.host, self.port, self.timeout
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_reports_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(probe.is_network_alive().await);
    }

    #[tokio::test]
    async fn test_probe_reports_closed_port() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(2));
        assert!(!probe.is_network_alive().await);
    }
}
