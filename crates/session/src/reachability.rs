//! Network reachability probe.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Reports whether the backend can be reached right now.
pub trait Reachability: Send + Sync {
    fn is_reachable(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Probes reachability by opening a TCP connection to the backend host.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpReachability {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Reachability for TcpReachability {
    fn is_reachable(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let addr = (self.host.as_str(), self.port);
            match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    debug!(host = %self.host, port = self.port, "backend unreachable: {e}");
                    false
                }
                Err(_) => {
                    debug!(host = %self.host, port = self.port, "reachability probe timed out");
                    false
                }
            }
        })
    }
}
