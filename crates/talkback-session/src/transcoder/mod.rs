//! External transcoder: launch seam, ffmpeg backend, and start-up supervision.
//!
//! The session never talks to a concrete process type. It asks a
//! [`TranscoderLauncher`] for a [`TranscoderProcess`] and takes its three
//! byte streams: session description in, encoded audio out, diagnostic
//! text on the side.

pub mod ffmpeg;
pub mod supervisor;

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::TalkbackError;

pub use ffmpeg::{FfmpegLauncher, transcoder_args};
pub use supervisor::{RunningTranscoder, ScanOutcome, scan_diagnostics, start_transcoder};

/// Owned readable byte stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Owned writable byte stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The three pipes of a running transcoder.
pub struct TranscoderStreams {
    /// Receives the session description, then is closed.
    pub input: BoxedWriter,
    /// Encoded audio.
    pub output: BoxedReader,
    /// Line-oriented diagnostic text.
    pub diagnostics: BoxedReader,
}

impl std::fmt::Debug for TranscoderStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscoderStreams").finish_non_exhaustive()
    }
}

/// Everything a launcher needs to start one transcoder.
#[derive(Clone, Debug)]
pub struct TranscoderProfile {
    /// Loopback port the transcoder reads RTP from.
    pub relay_port: u16,
    /// Session description written to the input stream.
    pub session_description: String,
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
}

/// Starts transcoder processes.
#[async_trait]
pub trait TranscoderLauncher: Send + Sync {
    /// Launch a transcoder for `profile`.
    async fn launch(
        &self,
        profile: &TranscoderProfile,
    ) -> Result<Box<dyn TranscoderProcess>, TalkbackError>;
}

/// A launched transcoder.
#[async_trait]
pub trait TranscoderProcess: Send {
    /// OS process id, if there is one.
    fn id(&self) -> Option<u32>;

    /// Hand out the process pipes. Returns `None` after the first call.
    fn take_streams(&mut self) -> Option<TranscoderStreams>;

    /// Terminate the process and reap it, waiting at most `grace`.
    async fn stop(&mut self, grace: Duration);
}
