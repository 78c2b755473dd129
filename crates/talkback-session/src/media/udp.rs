//! Plain UDP ingest: each datagram is one RTP audio frame.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use super::{MediaKind, MediaTrack, TrackReadError};

/// Minimum RTP fixed header length.
const RTP_HEADER_LEN: usize = 12;

/// Audio track fed by RTP datagrams on a local UDP socket.
#[derive(Debug)]
pub struct UdpRtpTrack {
    socket: UdpSocket,
    ssrc: AtomicU32,
    idle_timeout: Option<Duration>,
}

impl UdpRtpTrack {
    /// Bind `addr`. With an `idle_timeout`, a read that sees no datagram for
    /// that long reports end of stream.
    pub async fn bind(addr: SocketAddr, idle_timeout: Option<Duration>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        debug!(local = ?socket.local_addr().ok(), "rtp ingest bound");
        Ok(Self {
            socket,
            ssrc: AtomicU32::new(0),
            idle_timeout,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// SSRC from an RTP version 2 header, if `frame` carries one.
pub(crate) fn rtp_ssrc(frame: &[u8]) -> Option<u32> {
    if frame.len() < RTP_HEADER_LEN || frame[0] >> 6 != 2 {
        return None;
    }
    Some(u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]))
}

#[async_trait]
impl MediaTrack for UdpRtpTrack {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn ssrc(&self) -> u32 {
        self.ssrc.load(Ordering::Relaxed)
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TrackReadError> {
        let received = match self.idle_timeout {
            Some(idle) => tokio::time::timeout(idle, self.socket.recv(buf))
                .await
                .map_err(|_| TrackReadError::EndOfStream)?,
            None => self.socket.recv(buf).await,
        };
        let n = received.map_err(|e| TrackReadError::Failed(e.to_string()))?;
        if let Some(ssrc) = rtp_ssrc(&buf[..n]) {
            self.ssrc.store(ssrc, Ordering::Relaxed);
        }
        Ok(n)
    }
}
