//! Error taxonomy for talkback sessions.
//!
//! Setup kinds ([`TalkbackError::is_setup_error`]) are fatal to the open
//! attempt that produced them and trigger a full rollback. Stream kinds are
//! reported per occurrence by the relays and never end the session.

use std::fmt;

use thiserror::Error;

/// Which byte stream a steady-state error happened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// Inbound peer media track.
    Track,
    /// Loopback relay socket towards the transcoder.
    RelaySocket,
    /// Transcoder encoded output.
    TranscoderOutput,
    /// Transcoder diagnostic text.
    TranscoderDiagnostics,
    /// Outbound signaling socket.
    Signaling,
    /// Loss-indication feedback to the peer.
    Feedback,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Track => "track",
            Self::RelaySocket => "relay socket",
            Self::TranscoderOutput => "transcoder output",
            Self::TranscoderDiagnostics => "transcoder diagnostics",
            Self::Signaling => "signaling",
            Self::Feedback => "feedback",
        };
        f.write_str(name)
    }
}

/// Errors produced while opening or running a talkback session.
#[derive(Debug, Error)]
pub enum TalkbackError {
    /// Two-way audio is switched off in settings.
    #[error("two-way audio is disabled")]
    Disabled,

    /// The signaling endpoint lookup failed or reported failure.
    #[error("discovery failed for '{session_id}': {reason}")]
    Discovery {
        /// Session whose endpoint was requested.
        session_id: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Dialing or handshaking the signaling socket failed.
    #[error("signaling connect to {url} failed: {reason}")]
    SignalingConnect {
        /// Signaling URL that was dialed.
        url: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The loopback relay socket could not be set up.
    #[error("relay socket setup failed (relay port {port}): {source}")]
    RelaySocket {
        /// Relay port being targeted, 0 if none was leased yet.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The transcoder could not be launched or configured.
    #[error("transcoder failed to start: {reason}")]
    TranscoderStart {
        /// Why the start failed.
        reason: String,
    },

    /// A steady-state read failed.
    #[error("{stream} read failed: {reason}")]
    StreamRead {
        /// Stream that failed.
        stream: StreamKind,
        /// Why the read failed.
        reason: String,
    },

    /// A steady-state write failed.
    #[error("{stream} write failed: {reason}")]
    StreamWrite {
        /// Stream that failed.
        stream: StreamKind,
        /// Why the write failed.
        reason: String,
    },
}

impl TalkbackError {
    /// Whether this error aborts a session open.
    pub fn is_setup_error(&self) -> bool {
        !matches!(self, Self::StreamRead { .. } | Self::StreamWrite { .. })
    }

    pub(crate) fn transcoder_start(reason: impl fmt::Display) -> Self {
        Self::TranscoderStart {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(stream: StreamKind, reason: impl fmt::Display) -> Self {
        Self::StreamRead {
            stream,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(stream: StreamKind, reason: impl fmt::Display) -> Self {
        Self::StreamWrite {
            stream,
            reason: reason.to_string(),
        }
    }
}
