//! Opens talkback sessions.
//!
//! `open` acquires resources in a fixed order (signaling, relay port and
//! socket, transcoder) and then starts the four session tasks. A failure at
//! any step closes whatever was already acquired and returns the error, so
//! a caller only ever sees a fully open session or nothing.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use talkback_core::SessionId;
use talkback_settings::TalkbackSettings;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::discovery::{DiscoveryClient, HttpDiscovery};
use crate::errors::TalkbackError;
use crate::media::TrackSource;
use crate::outbound_relay::{OutboundRelayConfig, run_outbound_relay};
use crate::ports::PortAllocator;
use crate::relay_socket::RelaySocket;
use crate::sdp::session_description;
use crate::session::TalkbackSession;
use crate::signaling::{SignalingConnector, WsSignalingConnector};
use crate::track_relay::{TrackRelayOutcome, run_feedback_loop, run_track_relay};
use crate::transcoder::{
    FfmpegLauncher, TranscoderLauncher, TranscoderProfile, start_transcoder, transcoder_args,
};

/// Creates talkback sessions from settings and injected collaborators.
pub struct TalkbackController {
    settings: Arc<TalkbackSettings>,
    discovery: Arc<dyn DiscoveryClient>,
    signaling: Arc<dyn SignalingConnector>,
    launcher: Arc<dyn TranscoderLauncher>,
    ports: PortAllocator,
}

impl TalkbackController {
    /// Controller wired to the HTTP discovery service, WebSocket signaling
    /// and the ffmpeg transcoder.
    pub fn new(settings: TalkbackSettings) -> Self {
        let discovery = Arc::new(HttpDiscovery::new(&settings.discovery));
        let signaling = Arc::new(WsSignalingConnector::new(&settings.signaling));
        Self::with_collaborators(settings, discovery, signaling, Arc::new(FfmpegLauncher))
    }

    /// Controller with custom collaborators.
    pub fn with_collaborators(
        settings: TalkbackSettings,
        discovery: Arc<dyn DiscoveryClient>,
        signaling: Arc<dyn SignalingConnector>,
        launcher: Arc<dyn TranscoderLauncher>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            discovery,
            signaling,
            launcher,
            ports: PortAllocator::new(),
        }
    }

    /// Settings sessions are opened with.
    pub fn settings(&self) -> &TalkbackSettings {
        &self.settings
    }

    /// Relay port allocator shared by this controller's sessions.
    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Open a talkback session for `session_id` fed by `source`.
    pub async fn open(
        &self,
        session_id: impl Into<SessionId>,
        source: TrackSource,
    ) -> Result<TalkbackSession, TalkbackError> {
        let session_id = session_id.into();
        if !self.settings.two_way_audio.is_enabled() {
            debug!(%session_id, "two-way audio disabled, refusing talkback");
            return Err(TalkbackError::Disabled);
        }

        let mut session =
            TalkbackSession::new(session_id.clone(), self.settings.session.shutdown_timeout());
        let span = info_span!(
            "talkback",
            session_id = %session_id,
            talkback_id = %session.talkback_id(),
        );

        async {
            let url = self.discovery.resolve(&session_id).await?;
            match self.acquire(&mut session, &url, source).await {
                Ok(()) => {
                    info!(
                        url = %url,
                        relay_port = ?session.relay_port(),
                        vendor = %self.settings.two_way_audio,
                        "talkback session open"
                    );
                    Ok(session)
                }
                Err(e) => {
                    warn!(error = %e, "talkback open failed, rolling back");
                    session.close().await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn acquire(
        &self,
        session: &mut TalkbackSession,
        url: &str,
        source: TrackSource,
    ) -> Result<(), TalkbackError> {
        let settings = &self.settings;
        let span = tracing::Span::current();
        let cancel = session.cancel_token();
        let gate = session.gate_handle();

        let signaling = self.signaling.connect(url).await?;
        session.attach_signaling(Arc::clone(&signaling));

        let host = relay_host(&settings.relay.host)?;
        let lease = self
            .ports
            .lease(host)
            .map_err(|e| TalkbackError::RelaySocket { port: 0, source: e })?;
        let relay_port = lease.port();
        session.attach_port_lease(lease);

        let socket = Arc::new(
            RelaySocket::open(host, relay_port, settings.relay.write_deadline()).await?,
        );
        session.attach_relay_socket(Arc::clone(&socket));

        let profile = TranscoderProfile {
            relay_port,
            session_description: session_description(
                &settings.transcoder.ready_marker,
                host,
                relay_port,
                settings.relay.payload_type,
            ),
            program: settings.transcoder.program.clone(),
            args: transcoder_args(),
        };
        let running = start_transcoder(
            self.launcher.as_ref(),
            &profile,
            settings.transcoder.ready_marker.clone(),
            Arc::clone(&gate),
            cancel.clone(),
        )
        .await?;
        session.attach_transcoder(running.process);
        session.attach_task("diagnostics", running.scanner);

        let outbound = tokio::spawn(
            {
                let cancel = cancel.clone();
                let config = OutboundRelayConfig {
                    chunk_bytes: settings.transcoder.output_chunk_bytes,
                    retry_backoff: settings.transcoder.read_retry_backoff(),
                };
                async move {
                    let _ = run_outbound_relay(running.output, signaling, config, cancel).await;
                }
            }
            .instrument(span.clone()),
        );
        session.attach_task("outbound", outbound);

        let track_relay = tokio::spawn(
            {
                let track = Arc::clone(&source.track);
                let cancel = cancel.clone();
                let track_ended = session.track_ended();
                let read_buffer_bytes = settings.relay.read_buffer_bytes;
                async move {
                    let report =
                        run_track_relay(track, socket, gate, read_buffer_bytes, cancel).await;
                    if !matches!(report.outcome, TrackRelayOutcome::Cancelled) {
                        info!(
                            frames_forwarded = report.stats.frames_forwarded,
                            "inbound track ended"
                        );
                    }
                    track_ended.cancel();
                }
            }
            .instrument(span.clone()),
        );
        session.attach_task("track", track_relay);

        let feedback = tokio::spawn(
            {
                let interval = settings.feedback.interval();
                async move {
                    let sent =
                        run_feedback_loop(source.feedback, source.track, interval, cancel).await;
                    debug!(sent, "feedback loop stopped");
                }
            }
            .instrument(span),
        );
        session.attach_task("feedback", feedback);

        Ok(())
    }
}

fn relay_host(host: &str) -> Result<IpAddr, TalkbackError> {
    host.parse().map_err(|e| TalkbackError::RelaySocket {
        port: 0,
        source: io::Error::new(io::ErrorKind::InvalidInput, format!("relay host '{host}': {e}")),
    })
}
