//! Peer track to transcoder relay, plus the periodic loss-indication loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::{StreamKind, TalkbackError};
use crate::gate::ReadinessGate;
use crate::media::{FeedbackSink, MediaKind, MediaTrack, TrackReadError};
use crate::relay_socket::RelaySocket;

/// Why the track relay stopped.
#[derive(Debug)]
pub enum TrackRelayOutcome {
    /// The peer stopped sending.
    EndOfStream,
    /// The session was cancelled.
    Cancelled,
    /// A track read failed.
    ReadFailed(TalkbackError),
}

/// Frame counters for one relay run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackRelayStats {
    /// Frames read from the track.
    pub frames_read: u64,
    /// Frames written to the relay socket.
    pub frames_forwarded: u64,
    /// Frames discarded because the gate was closed or the track not audio.
    pub frames_dropped: u64,
    /// Failed or timed-out relay writes.
    pub write_errors: u64,
}

/// Result of [`run_track_relay`].
#[derive(Debug)]
pub struct TrackRelayReport {
    /// Why the loop ended.
    pub outcome: TrackRelayOutcome,
    /// Frame counters.
    pub stats: TrackRelayStats,
}

/// Read frames from `track` and forward audio to `socket` once `gate` is open.
///
/// Frames read while the gate is pending are dropped. Write failures are
/// logged and the loop continues; only end of stream, a read failure, or
/// cancellation end it.
pub async fn run_track_relay(
    track: Arc<dyn MediaTrack>,
    socket: Arc<RelaySocket>,
    gate: Arc<ReadinessGate>,
    read_buffer_bytes: usize,
    cancel: CancellationToken,
) -> TrackRelayReport {
    let mut buf = vec![0u8; read_buffer_bytes];
    let mut stats = TrackRelayStats::default();
    let forwardable = track.kind() == MediaKind::Audio;
    if !forwardable {
        debug!(kind = %track.kind(), "track is not audio, frames will be dropped");
    }

    let outcome = loop {
        let read = tokio::select! {
            () = cancel.cancelled() => break TrackRelayOutcome::Cancelled,
            read = track.read(&mut buf) => read,
        };

        let n = match read {
            Ok(n) => n,
            Err(TrackReadError::EndOfStream) => break TrackRelayOutcome::EndOfStream,
            Err(TrackReadError::Failed(reason)) => {
                let err = TalkbackError::read(StreamKind::Track, reason);
                warn!(error = %err, "track read failed");
                break TrackRelayOutcome::ReadFailed(err);
            }
        };
        stats.frames_read += 1;

        if !forwardable || !gate.is_open() {
            stats.frames_dropped += 1;
            continue;
        }

        match socket.send(&buf[..n]).await {
            Ok(_) => stats.frames_forwarded += 1,
            Err(e) => {
                stats.write_errors += 1;
                warn!(error = %e, len = n, "relay write failed");
            }
        }
    };

    debug!(?outcome, ?stats, "track relay stopped");
    TrackRelayReport { outcome, stats }
}

/// Send a loss indication for the track every `interval` until cancelled.
///
/// Runs regardless of gate state. Send failures are logged and ignored.
/// Returns the number of indications sent successfully.
pub async fn run_feedback_loop(
    feedback: Arc<dyn FeedbackSink>,
    track: Arc<dyn MediaTrack>,
    interval: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let ssrc = track.ssrc();
        match feedback.send_loss_indication(ssrc).await {
            Ok(()) => {
                sent += 1;
                trace!(ssrc, "loss indication sent");
            }
            Err(e) => warn!(ssrc, error = %e, "loss indication failed"),
        }
    }
    sent
}
