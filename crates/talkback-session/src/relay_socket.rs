//! Loopback datagram socket carrying track frames to the transcoder.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::errors::{StreamKind, TalkbackError};

/// A UDP socket bound to an ephemeral loopback port and connected to the
/// transcoder's relay port.
#[derive(Debug)]
pub struct RelaySocket {
    socket: UdpSocket,
    target: SocketAddr,
    write_deadline: Duration,
}

impl RelaySocket {
    /// Bind `host:0` and connect to `host:relay_port`.
    pub async fn open(
        host: IpAddr,
        relay_port: u16,
        write_deadline: Duration,
    ) -> Result<Self, TalkbackError> {
        let setup = |source: io::Error| TalkbackError::RelaySocket {
            port: relay_port,
            source,
        };

        let socket = UdpSocket::bind(SocketAddr::new(host, 0))
            .await
            .map_err(setup)?;
        let target = SocketAddr::new(host, relay_port);
        socket.connect(target).await.map_err(setup)?;

        debug!(
            local = ?socket.local_addr().ok(),
            %target,
            "relay socket open"
        );
        Ok(Self {
            socket,
            target,
            write_deadline,
        })
    }

    /// Address frames are sent to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Configured per-write deadline.
    pub fn write_deadline(&self) -> Duration {
        self.write_deadline
    }

    /// Send one frame, giving up once the write deadline passes.
    pub async fn send(&self, frame: &[u8]) -> Result<usize, TalkbackError> {
        match tokio::time::timeout(self.write_deadline, self.socket.send(frame)).await {
            Ok(Ok(sent)) => Ok(sent),
            Ok(Err(e)) => Err(TalkbackError::write(StreamKind::RelaySocket, e)),
            Err(_) => Err(TalkbackError::write(
                StreamKind::RelaySocket,
                format!("write deadline of {:?} exceeded", self.write_deadline),
            )),
        }
    }
}
