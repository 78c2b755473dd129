//! In-process fakes for the session integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use talkback_core::SessionId;
use talkback_session::discovery::DiscoveryClient;
use talkback_session::signaling::{SignalingConnection, SignalingConnector};
use talkback_session::transcoder::{
    TranscoderLauncher, TranscoderProcess, TranscoderProfile, TranscoderStreams,
};
use talkback_session::{
    FeedbackSink, MediaKind, MediaTrack, TalkbackController, TalkbackError, TrackReadError,
    TrackSource,
};
use talkback_settings::TalkbackSettings;
use tokio::io::{DuplexStream, duplex};
use tokio::sync::mpsc;

pub const MARKER: &str = "TalkbackRelay";

/// Settings tuned for fast tests.
pub fn test_settings() -> TalkbackSettings {
    let mut settings = TalkbackSettings::default();
    settings.session.shutdown_timeout_ms = 500;
    settings.relay.write_deadline_ms = 200;
    settings
}

// ── discovery ───────────────────────────────────────────────────────

pub struct FakeDiscovery {
    url: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeDiscovery {
    pub fn resolving(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Some(url.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DiscoveryClient for FakeDiscovery {
    async fn resolve(&self, session_id: &SessionId) -> Result<String, TalkbackError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        self.url.clone().ok_or_else(|| TalkbackError::Discovery {
            session_id: session_id.to_string(),
            reason: "no url".into(),
        })
    }
}

// ── signaling ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSignaling {
    pub sent: Mutex<Vec<Bytes>>,
    pub close_calls: AtomicUsize,
}

impl FakeSignaling {
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent.lock().iter().flat_map(|b| b.iter().copied()).collect()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingConnection for FakeSignaling {
    async fn send_binary(&self, payload: Bytes) -> Result<(), TalkbackError> {
        self.sent.lock().push(payload);
        Ok(())
    }

    async fn close(&self) {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSignalingConnector {
    pub fail: AtomicBool,
    pub connections: Mutex<Vec<Arc<FakeSignaling>>>,
}

impl FakeSignalingConnector {
    pub fn failing() -> Arc<Self> {
        let connector = Self::default();
        connector.fail.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    pub fn last(&self) -> Option<Arc<FakeSignaling>> {
        self.connections.lock().last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[async_trait]
impl SignalingConnector for FakeSignalingConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn SignalingConnection>, TalkbackError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TalkbackError::SignalingConnect {
                url: url.into(),
                reason: "connection refused".into(),
            });
        }
        let conn = Arc::new(FakeSignaling::default());
        self.connections.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}

// ── transcoder ──────────────────────────────────────────────────────

/// Far ends of a fake transcoder's pipes.
pub struct TranscoderControl {
    pub profile: TranscoderProfile,
    /// Reads what the session wrote to the transcoder input.
    pub input: DuplexStream,
    /// Writes encoded output.
    pub output: DuplexStream,
    /// Writes diagnostic text.
    pub diagnostics: DuplexStream,
}

#[derive(Default)]
pub struct FakeLauncher {
    pub fail: AtomicBool,
    pub launches: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    control: Mutex<Option<TranscoderControl>>,
}

impl FakeLauncher {
    pub fn failing() -> Arc<Self> {
        let launcher = Self::default();
        launcher.fail.store(true, Ordering::SeqCst);
        Arc::new(launcher)
    }

    pub fn take_control(&self) -> TranscoderControl {
        self.control.lock().take().expect("transcoder was not launched")
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    streams: Option<TranscoderStreams>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl TranscoderProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn take_streams(&mut self) -> Option<TranscoderStreams> {
        self.streams.take()
    }

    async fn stop(&mut self, _grace: Duration) {
        let _ = self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscoderLauncher for FakeLauncher {
    async fn launch(
        &self,
        profile: &TranscoderProfile,
    ) -> Result<Box<dyn TranscoderProcess>, TalkbackError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TalkbackError::TranscoderStart {
                reason: "no such program".into(),
            });
        }
        let _ = self.launches.fetch_add(1, Ordering::SeqCst);

        let (input, input_far) = duplex(4096);
        let (output_far, output) = duplex(64 * 1024);
        let (diagnostics_far, diagnostics) = duplex(4096);
        *self.control.lock() = Some(TranscoderControl {
            profile: profile.clone(),
            input: input_far,
            output: output_far,
            diagnostics: diagnostics_far,
        });

        Ok(Box::new(FakeProcess {
            streams: Some(TranscoderStreams {
                input: Box::new(input),
                output: Box::new(output),
                diagnostics: Box::new(diagnostics),
            }),
            stops: Arc::clone(&self.stops),
        }))
    }
}

// ── media ───────────────────────────────────────────────────────────

pub struct FakeTrack {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[async_trait]
impl MediaTrack for FakeTrack {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn ssrc(&self) -> u32 {
        0x1234
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TrackReadError> {
        match self.rx.lock().await.recv().await {
            Some(frame) => {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            None => Err(TrackReadError::EndOfStream),
        }
    }
}

#[derive(Default)]
pub struct FakeFeedback {
    pub sent: AtomicUsize,
}

#[async_trait]
impl FeedbackSink for FakeFeedback {
    async fn send_loss_indication(&self, _media_ssrc: u32) -> Result<(), TalkbackError> {
        let _ = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A track source plus the sender feeding its frames. Dropping the sender
/// ends the track.
pub fn fake_source() -> (TrackSource, mpsc::UnboundedSender<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let track = Arc::new(FakeTrack {
        rx: tokio::sync::Mutex::new(rx),
    });
    (
        TrackSource::new(track, Arc::new(FakeFeedback::default())),
        tx,
    )
}

// ── harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub controller: TalkbackController,
    pub discovery: Arc<FakeDiscovery>,
    pub signaling: Arc<FakeSignalingConnector>,
    pub launcher: Arc<FakeLauncher>,
}

impl Harness {
    pub fn new(settings: TalkbackSettings) -> Self {
        Self::with(
            settings,
            Arc::new(FakeSignalingConnector::default()),
            Arc::new(FakeLauncher::default()),
        )
    }

    pub fn with(
        settings: TalkbackSettings,
        signaling: Arc<FakeSignalingConnector>,
        launcher: Arc<FakeLauncher>,
    ) -> Self {
        let discovery = FakeDiscovery::resolving("ws://camera.local/talkback");
        let controller = TalkbackController::with_collaborators(
            settings,
            discovery.clone(),
            signaling.clone(),
            launcher.clone(),
        );
        Self {
            controller,
            discovery,
            signaling,
            launcher,
        }
    }
}
