//! ffmpeg-backed transcoder: Opus RTP in, ADTS AAC out.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{TranscoderLauncher, TranscoderProcess, TranscoderProfile, TranscoderStreams};
use crate::errors::TalkbackError;

/// Arguments for a low-latency Opus/RTP to mono 22.05 kHz ADTS AAC pipeline.
///
/// The session description arrives on stdin and the encoded stream leaves
/// on stdout, so the only network input is the loopback RTP port named in
/// the description.
pub fn transcoder_args() -> Vec<String> {
    [
        "-protocol_whitelist",
        "pipe,rtp,udp,file,crypto",
        // Microseconds. Keeps the RTP input waiting while relay is gated.
        "-timeout",
        "20000000000000",
        "-f",
        "sdp",
        "-i",
        "pipe:0",
        "-vn",
        "-avioflags",
        "direct",
        "-fflags",
        "nobuffer",
        "-flags",
        "low_delay",
        "-acodec",
        "aac",
        "-profile:a",
        "aac_low",
        "-fflags",
        "+flush_packets",
        "-fflags",
        "discardcorrupt",
        "-flush_packets",
        "1",
        "-flags",
        "+global_header",
        "-reset_timestamps",
        "1",
        "-ar",
        "22050",
        "-b:a",
        "16000",
        "-map",
        "0:a:0",
        "-ac",
        "1",
        "-muxdelay",
        "0",
        "-f",
        "adts",
        "pipe:1",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Launches the transcoder as a child process with all three stdio pipes.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegLauncher;

#[async_trait]
impl TranscoderLauncher for FfmpegLauncher {
    async fn launch(
        &self,
        profile: &TranscoderProfile,
    ) -> Result<Box<dyn TranscoderProcess>, TalkbackError> {
        let mut cmd = Command::new(&profile.program);
        let _ = cmd
            .args(&profile.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %profile.program,
            relay_port = profile.relay_port,
            "spawning transcoder"
        );

        let child = cmd.spawn().map_err(|e| {
            TalkbackError::transcoder_start(format!("failed to spawn {}: {e}", profile.program))
        })?;
        Ok(Box::new(FfmpegProcess { child }))
    }
}

/// Handle on a spawned transcoder child.
#[derive(Debug)]
pub struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl TranscoderProcess for FfmpegProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_streams(&mut self) -> Option<TranscoderStreams> {
        let input = self.child.stdin.take()?;
        let output = self.child.stdout.take()?;
        let diagnostics = self.child.stderr.take()?;
        Some(TranscoderStreams {
            input: Box::new(input),
            output: Box::new(output),
            diagnostics: Box::new(diagnostics),
        })
    }

    async fn stop(&mut self, grace: Duration) {
        let pid = self.child.id();
        if let Err(e) = self.child.start_kill() {
            // Already reaped or exited on its own.
            debug!(?pid, error = %e, "transcoder kill skipped");
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?pid, %status, "transcoder exited"),
            Ok(Err(e)) => warn!(?pid, error = %e, "transcoder wait failed"),
            Err(_) => warn!(?pid, grace_ms = grace.as_millis(), "transcoder did not exit in time"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(program: &str, args: &[&str]) -> TranscoderProfile {
        TranscoderProfile {
            relay_port: 4000,
            session_description: String::new(),
            program: program.into(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn args_read_sdp_from_stdin_and_write_adts_to_stdout() {
        let args = transcoder_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("-protocol_whitelist pipe,rtp,udp,file,crypto"));
        assert!(joined.contains("-f sdp -i pipe:0"));
        assert!(joined.ends_with("-f adts pipe:1"));
        assert!(joined.contains("-ar 22050"));
        assert!(joined.contains("-ac 1"));
    }

    #[test]
    fn rtp_input_waits_for_gated_packets() {
        let args = transcoder_args();
        let timeout = args.iter().position(|a| a == "-timeout").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[timeout + 1], "20000000000000");
        assert!(timeout < input);
    }

    #[tokio::test]
    async fn missing_program_is_a_start_error() {
        let err = FfmpegLauncher
            .launch(&profile("/nonexistent/transcoder-binary", &[]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TalkbackError::TranscoderStart { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipes_are_wired_and_stop_reaps() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut process = FfmpegLauncher
            .launch(&profile("sh", &["-c", "echo ready >&2; cat"]))
            .await
            .unwrap();
        assert!(process.id().is_some());

        let mut streams = process.take_streams().unwrap();
        assert!(process.take_streams().is_none());

        streams.input.write_all(b"hello").await.unwrap();
        streams.input.shutdown().await.unwrap();
        drop(streams.input);

        let mut out = String::new();
        let _ = streams.output.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello");

        let mut diag = String::new();
        let _ = streams.diagnostics.read_to_string(&mut diag).await.unwrap();
        assert_eq!(diag.trim(), "ready");

        process.stop(Duration::from_secs(2)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_kills_a_running_process() {
        let mut process = FfmpegLauncher
            .launch(&profile("sleep", &["30"]))
            .await
            .unwrap();
        let started = std::time::Instant::now();
        process.stop(Duration::from_secs(2)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
