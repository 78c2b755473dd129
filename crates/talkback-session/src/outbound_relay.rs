//! Transcoder output to signaling socket relay.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{StreamKind, TalkbackError};
use crate::signaling::SignalingConnection;
use crate::transcoder::BoxedReader;

/// Outbound relay tuning.
#[derive(Clone, Copy, Debug)]
pub struct OutboundRelayConfig {
    /// Maximum bytes per forwarded message.
    pub chunk_bytes: usize,
    /// Pause after a failed output read.
    pub retry_backoff: Duration,
}

/// Why the outbound relay stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundEnd {
    /// The transcoder closed its output.
    EndOfOutput,
    /// The session was cancelled.
    Cancelled,
}

/// Counters for one outbound relay run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutboundRelayReport {
    /// Messages sent to the signaling socket.
    pub chunks_forwarded: u64,
    /// Bytes sent to the signaling socket.
    pub bytes_forwarded: u64,
    /// Failed output reads.
    pub read_errors: u64,
    /// Failed signaling sends.
    pub send_errors: u64,
    /// Why the relay stopped.
    pub ended_by: OutboundEnd,
}

/// Forward transcoder output to the signaling socket in chunks of at most
/// `chunk_bytes`, one binary message per chunk.
///
/// Chunk boundaries follow whatever each read returns; no framing is
/// applied. Read and send failures are logged and the loop continues.
pub async fn run_outbound_relay(
    mut output: BoxedReader,
    signaling: Arc<dyn SignalingConnection>,
    config: OutboundRelayConfig,
    cancel: CancellationToken,
) -> OutboundRelayReport {
    let mut buf = vec![0u8; config.chunk_bytes];
    let mut report = OutboundRelayReport {
        chunks_forwarded: 0,
        bytes_forwarded: 0,
        read_errors: 0,
        send_errors: 0,
        ended_by: OutboundEnd::Cancelled,
    };

    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = output.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                report.ended_by = OutboundEnd::EndOfOutput;
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                report.ended_by = OutboundEnd::EndOfOutput;
                break;
            }
            Ok(n) => {
                match signaling.send_binary(Bytes::copy_from_slice(&buf[..n])).await {
                    Ok(()) => {
                        report.chunks_forwarded += 1;
                        report.bytes_forwarded += n as u64;
                    }
                    Err(e) => {
                        report.send_errors += 1;
                        warn!(error = %e, len = n, "signaling send failed");
                    }
                }
            }
            Err(e) => {
                report.read_errors += 1;
                let err = TalkbackError::read(StreamKind::TranscoderOutput, e);
                warn!(error = %err, "transcoder output read failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(config.retry_backoff) => {}
                }
            }
        }
    }

    debug!(?report, "outbound relay stopped");
    report
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf, duplex};

    use super::*;

    #[derive(Default)]
    struct RecordingSignaling {
        sent: parking_lot::Mutex<Vec<Bytes>>,
        fail_first: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl SignalingConnection for RecordingSignaling {
        async fn send_binary(&self, payload: Bytes) -> Result<(), TalkbackError> {
            if self.fail_first.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(TalkbackError::write(StreamKind::Signaling, "reset"));
            }
            self.sent.lock().push(payload);
            Ok(())
        }
        async fn close(&self) {}
    }

    /// Replays a fixed script of read results.
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    buf.put_slice(&bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    fn config(chunk_bytes: usize) -> OutboundRelayConfig {
        OutboundRelayConfig {
            chunk_bytes,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn chunks_are_bounded_and_in_order() {
        let signaling = Arc::new(RecordingSignaling::default());
        let (mut writer, reader) = duplex(64 * 1024);
        writer.write_all(&[7u8; 12_000]).await.unwrap();
        drop(writer);

        let report = run_outbound_relay(
            Box::new(reader),
            signaling.clone(),
            config(5000),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.ended_by, OutboundEnd::EndOfOutput);
        assert_eq!(report.bytes_forwarded, 12_000);
        let sent = signaling.sent.lock();
        assert!(sent.iter().all(|chunk| chunk.len() <= 5000));
        assert_eq!(sent.iter().map(Bytes::len).sum::<usize>(), 12_000);
    }

    #[tokio::test]
    async fn read_errors_are_survived() {
        let signaling = Arc::new(RecordingSignaling::default());
        let reader = ScriptedReader {
            script: VecDeque::from(vec![
                Ok(b"aa".to_vec()),
                Err(io::Error::other("transient")),
                Ok(b"bb".to_vec()),
            ]),
        };

        let report = run_outbound_relay(
            Box::new(reader),
            signaling.clone(),
            config(5000),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.read_errors, 1);
        assert_eq!(report.chunks_forwarded, 2);
        assert_eq!(
            *signaling.sent.lock(),
            vec![Bytes::from_static(b"aa"), Bytes::from_static(b"bb")]
        );
    }

    #[tokio::test]
    async fn send_errors_are_survived() {
        let signaling = Arc::new(RecordingSignaling::default());
        signaling.fail_first.store(true, std::sync::atomic::Ordering::SeqCst);
        let reader = ScriptedReader {
            script: VecDeque::from(vec![Ok(b"lost".to_vec()), Ok(b"kept".to_vec())]),
        };

        let report = run_outbound_relay(
            Box::new(reader),
            signaling.clone(),
            config(5000),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.send_errors, 1);
        assert_eq!(report.chunks_forwarded, 1);
        assert_eq!(*signaling.sent.lock(), vec![Bytes::from_static(b"kept")]);
    }

    #[tokio::test]
    async fn unexpected_eof_ends_cleanly() {
        let signaling = Arc::new(RecordingSignaling::default());
        let reader = ScriptedReader {
            script: VecDeque::from(vec![Err(io::Error::from(io::ErrorKind::UnexpectedEof))]),
        };
        let report =
            run_outbound_relay(Box::new(reader), signaling, config(5000), CancellationToken::new())
                .await;
        assert_eq!(report.ended_by, OutboundEnd::EndOfOutput);
        assert_eq!(report.read_errors, 0);
    }

    #[tokio::test]
    async fn cancel_stops_an_idle_relay() {
        let signaling = Arc::new(RecordingSignaling::default());
        let (_writer, reader) = duplex(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_outbound_relay(
            Box::new(reader),
            signaling,
            config(5000),
            cancel.clone(),
        ));
        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.ended_by, OutboundEnd::Cancelled);
    }
}
