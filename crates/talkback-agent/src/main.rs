//! # talkback-agent
//!
//! Receives Opus RTP on a local UDP port and streams it into a camera's
//! talkback channel until Ctrl-C or the sender goes quiet.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use talkback_session::media::UdpRtpTrack;
use talkback_session::{NoFeedback, Readiness, TalkbackController, TrackSource};
use talkback_settings::TalkbackSettings;

/// Stream RTP audio to a camera's talkback channel.
#[derive(Parser, Debug)]
#[command(name = "talkback-agent", about = "Stream RTP audio to a camera's talkback channel")]
struct Cli {
    /// Camera to talk back to.
    #[arg(long)]
    camera_id: String,

    /// Local address to receive Opus RTP on.
    #[arg(long, default_value = "127.0.0.1:5004")]
    listen: SocketAddr,

    /// Settings file (defaults to `~/.talkback/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Stop after this many seconds without RTP (0 waits forever).
    #[arg(long, default_value = "30")]
    idle_timeout_secs: u64,
}

impl Cli {
    fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn load_settings(cli: &Cli) -> Result<TalkbackSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(talkback_settings::settings_path);
    let mut settings = talkback_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    talkback_core::logging::init_subscriber(&settings.logging.level);

    let track = UdpRtpTrack::bind(cli.listen, cli.idle_timeout())
        .await
        .with_context(|| format!("Failed to bind RTP ingest on {}", cli.listen))?;
    tracing::info!(listen = %cli.listen, camera_id = %cli.camera_id, "waiting for RTP");
    let source = TrackSource::new(Arc::new(track), Arc::new(NoFeedback));

    let controller = TalkbackController::new(settings);
    let session = controller
        .open(cli.camera_id.as_str(), source)
        .await
        .context("Failed to open talkback session")?;

    let track_ended = session.track_ended();
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for ctrl-c")?;
            tracing::info!("interrupted");
        }
        () = track_ended.cancelled() => tracing::info!("RTP ingest ended"),
        () = async {
            match session.wait_for_readiness().await {
                Readiness::Ready => {
                    tracing::info!(
                        relay_port = ?session.relay_port(),
                        "transcoder ready, streaming"
                    );
                    std::future::pending::<()>().await;
                }
                state => tracing::error!(?state, "transcoder failed before becoming ready"),
            }
        } => {}
    }

    session.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["talkback-agent", "--camera-id", "cam-1"]);
        assert_eq!(cli.camera_id, "cam-1");
        assert_eq!(cli.listen, "127.0.0.1:5004".parse().unwrap());
        assert_eq!(cli.idle_timeout(), Some(Duration::from_secs(30)));
        assert!(cli.settings.is_none());
    }

    #[test]
    fn camera_id_is_required() {
        assert!(Cli::try_parse_from(["talkback-agent"]).is_err());
    }

    #[test]
    fn zero_idle_timeout_waits_forever() {
        let cli = Cli::parse_from([
            "talkback-agent",
            "--camera-id",
            "c",
            "--idle-timeout-secs",
            "0",
        ]);
        assert_eq!(cli.idle_timeout(), None);
    }

    #[test]
    fn log_level_flag_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"logging": {"level": "warn"}}"#).unwrap();

        let cli = Cli::parse_from([
            "talkback-agent",
            "--camera-id",
            "cam-1",
            "--settings",
            path.to_str().unwrap(),
            "--log-level",
            "debug",
        ]);
        assert_eq!(load_settings(&cli).unwrap().logging.level, "debug");
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{").unwrap();
        let cli = Cli::parse_from([
            "talkback-agent",
            "--camera-id",
            "cam-1",
            "--settings",
            path.to_str().unwrap(),
        ]);
        assert!(load_settings(&cli).is_err());
    }
}
