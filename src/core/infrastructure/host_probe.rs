//! Host facts consulted during validation.

use async_trait::async_trait;
use std::{
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    thread,
};
use tokio::net::TcpListener;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Number of logical cores on the host.
    fn logical_cores(&self) -> usize;

    /// True if a listener already holds the TCP port.
    async fn port_in_use(&self, port: u16) -> std::io::Result<bool>;
}

/// Probes the machine the orchestrator runs on.
#[derive(Debug, Clone)]
pub struct SystemHost {
    probe_address: IpAddr,
    cores_override: Option<usize>,
}

impl SystemHost {
    pub fn new(probe_address: IpAddr, cores_override: Option<usize>) -> Self {
        Self {
            probe_address,
            cores_override,
        }
    }
}

#[async_trait]
impl HostProbe for SystemHost {
    fn logical_cores(&self) -> usize {
        self.cores_override.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    async fn port_in_use(&self, port: u16) -> std::io::Result<bool> {
        match TcpListener::bind(SocketAddr::new(self.probe_address, port)).await {
            Ok(listener) => {
                drop(listener);
                Ok(false)
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, "port is held by another listener");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}
