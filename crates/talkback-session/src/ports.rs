//! Relay port leasing.
//!
//! Each session needs a loopback port for the transcoder to listen on. The
//! port is picked by binding an ephemeral socket and releasing it, then
//! recorded in the allocator so two live sessions of the same controller can
//! never be handed the same port.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;

const MAX_LEASE_ATTEMPTS: usize = 16;

type ActivePorts = Arc<Mutex<HashSet<u16>>>;

/// Hands out relay ports unique among its live leases.
#[derive(Clone, Debug, Default)]
pub struct PortAllocator {
    active: ActivePorts,
}

impl PortAllocator {
    /// Create an allocator with no active leases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease a free UDP port on `host`.
    pub fn lease(&self, host: IpAddr) -> io::Result<PortLease> {
        for _ in 0..MAX_LEASE_ATTEMPTS {
            let port = {
                let probe = UdpSocket::bind(SocketAddr::new(host, 0))?;
                probe.local_addr()?.port()
            };
            if self.active.lock().insert(port) {
                return Ok(PortLease {
                    port,
                    active: Arc::clone(&self.active),
                });
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("no unused relay port on {host} after {MAX_LEASE_ATTEMPTS} attempts"),
        ))
    }

    /// Number of leases currently held.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether `port` is currently leased.
    pub fn is_leased(&self, port: u16) -> bool {
        self.active.lock().contains(&port)
    }
}

/// A leased relay port, returned to its allocator on drop.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    active: ActivePorts,
}

impl PortLease {
    /// The leased port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        let _ = self.active.lock().remove(&self.port);
    }
}
