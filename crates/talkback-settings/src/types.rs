//! Settings types.
//!
//! Every section derives `Default` with the production values and uses
//! `#[serde(default)]`, so a partial user file only needs the keys it
//! overrides.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TalkbackSettings {
    /// Which camera family two-way audio is enabled for.
    pub two_way_audio: TwoWayAudioMode,
    /// Signaling endpoint discovery.
    pub discovery: DiscoverySettings,
    /// Outbound signaling socket.
    pub signaling: SignalingSettings,
    /// Loopback relay between the track reader and the transcoder.
    pub relay: RelaySettings,
    /// External transcoder process.
    pub transcoder: TranscoderSettings,
    /// Loss-indication feedback to the peer.
    pub feedback: FeedbackSettings,
    /// Session lifecycle.
    pub session: SessionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Two-way audio support per camera vendor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoWayAudioMode {
    /// Talkback requests are refused.
    Disabled,
    /// UniFi Protect cameras.
    #[default]
    Unifi,
    /// Dahua cameras.
    Dahua,
    /// Hikvision cameras.
    Hikvision,
}

impl TwoWayAudioMode {
    /// Whether talkback sessions may be opened.
    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }
}

impl fmt::Display for TwoWayAudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Unifi => write!(f, "unifi"),
            Self::Dahua => write!(f, "dahua"),
            Self::Hikvision => write!(f, "hikvision"),
        }
    }
}

/// Where to ask for a session's signaling URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverySettings {
    /// Base URL of the discovery service.
    pub base_url: String,
    /// Request path appended to `base_url`.
    pub path: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3404".to_string(),
            path: "/talkbackUrl".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl DiscoverySettings {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Signaling socket settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalingSettings {
    /// Dial + handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Skip server certificate validation on `wss://` (development only).
    pub accept_invalid_certs: bool,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            accept_invalid_certs: true,
        }
    }
}

impl SignalingSettings {
    /// Dial + handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Loopback relay socket settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Loopback host both ends bind to.
    pub host: String,
    /// RTP payload type announced in the session description.
    pub payload_type: u8,
    /// Per-write deadline in milliseconds.
    pub write_deadline_ms: u64,
    /// Track read buffer size in bytes.
    pub read_buffer_bytes: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            payload_type: 111,
            write_deadline_ms: 500,
            read_buffer_bytes: 5000,
        }
    }
}

impl RelaySettings {
    /// Per-write deadline.
    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms)
    }
}

/// External transcoder settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscoderSettings {
    /// Program to execute.
    pub program: String,
    /// Diagnostic-stream substring that signals readiness. Also used as the
    /// session name in the generated session description.
    pub ready_marker: String,
    /// Maximum bytes read from the transcoder output per forwarded chunk.
    pub output_chunk_bytes: usize,
    /// Pause after a failed output read, in milliseconds.
    pub read_retry_backoff_ms: u64,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            ready_marker: "TalkbackRelay".to_string(),
            output_chunk_bytes: 5000,
            read_retry_backoff_ms: 50,
        }
    }
}

impl TranscoderSettings {
    /// Pause after a failed output read.
    pub fn read_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms)
    }
}

/// Peer feedback settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackSettings {
    /// Interval between loss indications in milliseconds.
    pub interval_ms: u64,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self { interval_ms: 3000 }
    }
}

impl FeedbackSettings {
    /// Interval between loss indications.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// How long `close` waits for session tasks before aborting them.
    pub shutdown_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 2000,
        }
    }
}

impl SessionSettings {
    /// How long `close` waits for session tasks.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
