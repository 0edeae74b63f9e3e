//! Finding a controller that is no longer where the display expects it.

use crate::sync::bridge::AUTO_PORT_ATTEMPTS;
use crate::transport::Endpoint;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

const DISCOVERY_LOG_TARGET: &str = "nowplaying_sync::display::discovery";

/// Alternate lookup run after repeated connection failures.
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Returns a candidate endpoint, or `None` to keep the current one.
    async fn discover(&self, current: &Endpoint) -> Option<Endpoint>;
}

/// Never finds anything.
pub struct NoDiscovery;

#[async_trait]
impl EndpointDiscovery for NoDiscovery {
    async fn discover(&self, _current: &Endpoint) -> Option<Endpoint> {
        None
    }
}

/// Reads the port the controller recorded when it bound its listener.
pub struct PortFileDiscovery {
    path: PathBuf,
}

impl PortFileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EndpointDiscovery for PortFileDiscovery {
    async fn discover(&self, current: &Endpoint) -> Option<Endpoint> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(target: DISCOVERY_LOG_TARGET, path = %self.path.display(), "No port file: {}", e);
                return None;
            }
        };
        match raw.trim().parse::<u16>() {
            Ok(port) if port != 0 => Some(Endpoint::new(current.host.clone(), port)),
            _ => {
                debug!(target: DISCOVERY_LOG_TARGET, path = %self.path.display(), "Port file content {:?} is not a port.", raw);
                None
            }
        }
    }
}

/// Tries successive ports on the current host for a listener.
pub struct PortScanDiscovery {
    first_port: u16,
    count: u16,
    connect_timeout: Duration,
}

impl PortScanDiscovery {
    pub fn new(first_port: u16, count: u16) -> Self {
        Self {
            first_port,
            count,
            connect_timeout: Duration::from_millis(250),
        }
    }

    /// The range a controller started with `--auto-port` can land in.
    pub fn auto_port_range(first_port: u16) -> Self {
        Self::new(first_port, AUTO_PORT_ATTEMPTS)
    }
}

#[async_trait]
impl EndpointDiscovery for PortScanDiscovery {
    async fn discover(&self, current: &Endpoint) -> Option<Endpoint> {
        for offset in 0..self.count {
            let Some(port) = self.first_port.checked_add(offset) else {
                break;
            };
            let attempt = TcpStream::connect((current.host.as_str(), port));
            if let Ok(Ok(_stream)) = timeout(self.connect_timeout, attempt).await {
                debug!(target: DISCOVERY_LOG_TARGET, port, "Found a listener.");
                return Some(Endpoint::new(current.host.clone(), port));
            }
        }
        None
    }
}

/// Tries each strategy in order and returns the first hit.
pub struct ChainedDiscovery {
    strategies: Vec<Box<dyn EndpointDiscovery>>,
}

impl ChainedDiscovery {
    pub fn new(strategies: Vec<Box<dyn EndpointDiscovery>>) -> Self {
        Self { strategies }
    }
}

#[async_trait]
impl EndpointDiscovery for ChainedDiscovery {
    async fn discover(&self, current: &Endpoint) -> Option<Endpoint> {
        for strategy in &self.strategies {
            if let Some(found) = strategy.discover(current).await {
                info!(target: DISCOVERY_LOG_TARGET, "Discovered controller at {}", found);
                return Some(found);
            }
        }
        None
    }
}
