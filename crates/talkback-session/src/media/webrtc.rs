//! Peer-connection adapters over the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use ::webrtc::peer_connection::RTCPeerConnection;
use ::webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use ::webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use ::webrtc::track::track_remote::TrackRemote;
use ::webrtc::util::Marshal;

use super::{FeedbackSink, MediaKind, MediaTrack, TrackReadError};
use crate::errors::{StreamKind, TalkbackError};

/// Remote track of a negotiated peer connection.
#[derive(Clone)]
pub struct WebRtcTrack {
    track: Arc<TrackRemote>,
}

impl WebRtcTrack {
    /// Wrap a track delivered by `on_track`.
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl MediaTrack for WebRtcTrack {
    fn kind(&self) -> MediaKind {
        match self.track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }

    fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TrackReadError> {
        let (packet, _attrs) = self.track.read(buf).await.map_err(|e| match e {
            ::webrtc::Error::ErrClosedPipe => TrackReadError::EndOfStream,
            other => TrackReadError::Failed(other.to_string()),
        })?;
        // The relay forwards whole RTP packets, header included.
        let raw = packet
            .marshal()
            .map_err(|e| TrackReadError::Failed(e.to_string()))?;
        copy_packet(&raw, buf)
    }
}

/// Copy a whole packet into `buf`; a packet that does not fit is an error,
/// never a truncated frame.
fn copy_packet(raw: &[u8], buf: &mut [u8]) -> Result<usize, TrackReadError> {
    let Some(dst) = buf.get_mut(..raw.len()) else {
        return Err(TrackReadError::Failed(format!(
            "{}-byte packet exceeds {}-byte read buffer",
            raw.len(),
            buf.len()
        )));
    };
    dst.copy_from_slice(raw);
    Ok(raw.len())
}

/// Sends picture loss indications over the peer connection.
#[derive(Clone)]
pub struct PeerConnectionFeedback {
    peer: Arc<RTCPeerConnection>,
}

impl PeerConnectionFeedback {
    /// Use `peer` for RTCP feedback.
    pub fn new(peer: Arc<RTCPeerConnection>) -> Self {
        Self { peer }
    }
}

#[async_trait]
impl FeedbackSink for PeerConnectionFeedback {
    async fn send_loss_indication(&self, media_ssrc: u32) -> Result<(), TalkbackError> {
        let pli: Box<dyn ::webrtc::rtcp::packet::Packet + Send + Sync> =
            Box::new(PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc,
            });
        let _ = self
            .peer
            .write_rtcp(&[pli])
            .await
            .map_err(|e| TalkbackError::write(StreamKind::Feedback, e))?;
        Ok(())
    }
}
