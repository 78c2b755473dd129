//! Transcoder start-up: launch, hand over the session description, and
//! watch the diagnostic stream for the readiness marker.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, trace, warn};

use super::{BoxedReader, TranscoderLauncher, TranscoderProcess, TranscoderProfile};
use crate::errors::TalkbackError;
use crate::gate::ReadinessGate;

/// How long a transcoder that failed to start gets to exit.
const FAILED_START_GRACE: Duration = Duration::from_secs(2);

/// A transcoder that accepted its session description.
pub struct RunningTranscoder {
    /// The process handle, for shutdown.
    pub process: Box<dyn TranscoderProcess>,
    /// Encoded audio stream.
    pub output: BoxedReader,
    /// Diagnostic scanner task.
    pub scanner: JoinHandle<()>,
}

impl std::fmt::Debug for RunningTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningTranscoder")
            .field("pid", &self.process.id())
            .finish_non_exhaustive()
    }
}

/// How the diagnostic scan finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Marker seen, stream still open when cancelled.
    Ready,
    /// Marker seen, then the stream ended.
    EndedAfterReady,
    /// The stream ended before the marker; the gate was failed.
    EndedBeforeReady,
    /// Cancelled before the marker.
    Cancelled,
}

/// Launch the transcoder, write the session description to its input, and
/// start scanning its diagnostics for `marker`.
///
/// The input stream is closed after the description so the transcoder sees
/// end of input. Any failure stops the process before returning.
pub async fn start_transcoder(
    launcher: &dyn TranscoderLauncher,
    profile: &TranscoderProfile,
    marker: String,
    gate: Arc<ReadinessGate>,
    cancel: CancellationToken,
) -> Result<RunningTranscoder, TalkbackError> {
    let mut process = launcher.launch(profile).await?;

    let Some(streams) = process.take_streams() else {
        process.stop(FAILED_START_GRACE).await;
        return Err(TalkbackError::transcoder_start("transcoder pipes unavailable"));
    };

    let mut input = streams.input;
    let handoff = async {
        input
            .write_all(profile.session_description.as_bytes())
            .await?;
        input.flush().await?;
        input.shutdown().await
    };
    if let Err(e) = handoff.await {
        process.stop(FAILED_START_GRACE).await;
        return Err(TalkbackError::transcoder_start(format!(
            "session description write failed: {e}"
        )));
    }
    drop(input);

    debug!(pid = ?process.id(), relay_port = profile.relay_port, "transcoder configured");

    let diagnostics = streams.diagnostics;
    let scanner = tokio::spawn(
        async move {
            let outcome = scan_diagnostics(diagnostics, marker, gate, cancel).await;
            debug!(?outcome, "diagnostic scan finished");
        }
        .instrument(tracing::Span::current()),
    );

    Ok(RunningTranscoder {
        process,
        output: streams.output,
        scanner,
    })
}

/// Longest diagnostic line kept; longer lines are dropped up to the next
/// delimiter.
const MAX_DIAGNOSTIC_LINE: usize = 4096;

/// Splits diagnostics on `\r` or `\n`, skipping over-long lines.
///
/// Progress reports end in a bare `\r`, so both count as line ends.
struct DiagnosticLines {
    inner: AnyDelimiterCodec,
    dropped: u64,
}

impl DiagnosticLines {
    fn new(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\r\n".to_vec(),
                b"\n".to_vec(),
                max_length,
            ),
            dropped: 0,
        }
    }

    fn next_line(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<Bytes>, io::Error> {
        loop {
            let step = if eof {
                self.inner.decode_eof(src)
            } else {
                self.inner.decode(src)
            };
            match step {
                Ok(line) => return Ok(line),
                // The codec discards the rest of the line on the next call.
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => self.dropped += 1,
                Err(AnyDelimiterCodecError::Io(e)) => return Err(e),
            }
        }
    }
}

impl Decoder for DiagnosticLines {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        self.next_line(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        self.next_line(src, true)
    }
}

/// Read diagnostic lines until cancelled or the stream ends.
///
/// The first line containing `marker` opens `gate`; later occurrences are
/// ignored. Lines keep being drained after readiness so the transcoder
/// never blocks on a full pipe. End of stream while still pending fails
/// the gate.
pub async fn scan_diagnostics(
    reader: BoxedReader,
    marker: String,
    gate: Arc<ReadinessGate>,
    cancel: CancellationToken,
) -> ScanOutcome {
    let mut lines = FramedRead::new(reader, DiagnosticLines::new(MAX_DIAGNOSTIC_LINE));
    let mut ready = false;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                return if ready { ScanOutcome::Ready } else { ScanOutcome::Cancelled };
            }
            next = lines.next() => next,
        };

        match next {
            None => break,
            Some(Ok(line)) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if text.is_empty() {
                    continue;
                }
                if ready {
                    trace!(line = text, "transcoder");
                } else if text.contains(marker.as_str()) {
                    ready = true;
                    if gate.open() {
                        info!("transcoder ready");
                    }
                } else {
                    debug!(line = text, "transcoder");
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "transcoder diagnostics read failed");
                break;
            }
        }
    }

    let dropped = lines.decoder().dropped;
    if dropped > 0 {
        debug!(dropped, max_len = MAX_DIAGNOSTIC_LINE, "over-long diagnostic lines skipped");
    }

    if ready {
        debug!("transcoder diagnostics closed");
        ScanOutcome::EndedAfterReady
    } else {
        if gate.fail() {
            warn!("transcoder exited before becoming ready");
        }
        ScanOutcome::EndedBeforeReady
    }
}
