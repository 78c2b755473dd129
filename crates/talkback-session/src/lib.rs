//! # talkback-session
//!
//! Streams a remote peer's audio track into a camera's talkback channel.
//!
//! A session looks up the camera's signaling URL, connects to it, starts an
//! external transcoder fed over a loopback RTP socket, and relays:
//!
//! - **track → transcoder**: peer frames go to the relay socket once the
//!   transcoder reports ready ([`gate`], [`track_relay`])
//! - **transcoder → signaling**: encoded audio chunks become binary
//!   messages ([`outbound_relay`])
//!
//! [`controller::TalkbackController::open`] builds a session and
//! [`session::TalkbackSession::close`] tears it down.

#![deny(unsafe_code)]

pub mod controller;
pub mod discovery;
pub mod errors;
pub mod gate;
pub mod media;
pub mod outbound_relay;
pub mod ports;
pub mod relay_socket;
pub mod sdp;
pub mod session;
pub mod signaling;
pub mod track_relay;
pub mod transcoder;

pub use controller::TalkbackController;
pub use errors::{StreamKind, TalkbackError};
pub use gate::{Readiness, ReadinessGate};
pub use media::{FeedbackSink, MediaKind, MediaTrack, NoFeedback, TrackReadError, TrackSource};
pub use session::TalkbackSession;
