//! Inbound media seam.
//!
//! A session consumes one [`MediaTrack`] and reports loss to the peer via a
//! [`FeedbackSink`]. Production adapters live in [`udp`] and, behind the
//! `webrtc` feature, in [`webrtc`].

pub mod udp;
#[cfg(feature = "webrtc")]
pub mod webrtc;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use crate::errors::TalkbackError;

pub use udp::UdpRtpTrack;

/// Kind of media a track carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio frames; the only kind the relay forwards.
    Audio,
    /// Video frames.
    Video,
    /// Not negotiated or unrecognized.
    Unknown,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Why a track read returned no frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TrackReadError {
    /// The peer stopped sending; no further frames will arrive.
    #[error("end of stream")]
    EndOfStream,
    /// The read failed.
    #[error("{0}")]
    Failed(String),
}

/// A stream of encoded media frames from the remote peer.
#[async_trait]
pub trait MediaTrack: Send + Sync {
    /// What the track carries.
    fn kind(&self) -> MediaKind;

    /// Synchronization source of the track, 0 until known.
    fn ssrc(&self) -> u32;

    /// Read one frame into `buf`, returning its length.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TrackReadError>;
}

/// Sends loss indications back to the peer.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    /// Ask the sender of `media_ssrc` to refresh its stream.
    async fn send_loss_indication(&self, media_ssrc: u32) -> Result<(), TalkbackError>;
}

/// A track together with the feedback path to its sender.
#[derive(Clone)]
pub struct TrackSource {
    /// Inbound track.
    pub track: Arc<dyn MediaTrack>,
    /// Feedback path to the track's sender.
    pub feedback: Arc<dyn FeedbackSink>,
}

impl TrackSource {
    /// Bundle a track with its feedback sink.
    pub fn new(track: Arc<dyn MediaTrack>, feedback: Arc<dyn FeedbackSink>) -> Self {
        Self { track, feedback }
    }
}

impl fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackSource")
            .field("kind", &self.track.kind())
            .field("ssrc", &self.track.ssrc())
            .finish()
    }
}

/// Feedback sink for transports without a return path.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFeedback;

#[async_trait]
impl FeedbackSink for NoFeedback {
    async fn send_loss_indication(&self, media_ssrc: u32) -> Result<(), TalkbackError> {
        trace!(media_ssrc, "no feedback path, loss indication dropped");
        Ok(())
    }
}
