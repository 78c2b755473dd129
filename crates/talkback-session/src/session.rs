//! A live talkback session and its teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use talkback_core::{SessionId, TalkbackId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::{Readiness, ReadinessGate};
use crate::ports::PortLease;
use crate::relay_socket::RelaySocket;
use crate::signaling::SignalingConnection;
use crate::transcoder::TranscoderProcess;

/// Handles released by [`TalkbackSession::close`], each at most once.
#[derive(Default)]
struct SessionResources {
    signaling: Option<Arc<dyn SignalingConnection>>,
    port_lease: Option<PortLease>,
    relay_socket: Option<Arc<RelaySocket>>,
    transcoder: Option<Box<dyn TranscoderProcess>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

/// One talkback stream from a peer track to a signaling socket.
///
/// Returned fully open by
/// [`TalkbackController::open`](crate::controller::TalkbackController::open).
/// Must be closed with [`close`](Self::close); dropping an open session
/// only cancels its tasks.
pub struct TalkbackSession {
    session_id: SessionId,
    talkback_id: TalkbackId,
    cancel: CancellationToken,
    track_ended: CancellationToken,
    gate: Arc<ReadinessGate>,
    relay_port: AtomicU16,
    shutdown_timeout: Duration,
    closed: AtomicBool,
    resources: Mutex<SessionResources>,
}

impl TalkbackSession {
    pub(crate) fn new(session_id: SessionId, shutdown_timeout: Duration) -> Self {
        Self {
            session_id,
            talkback_id: TalkbackId::new(),
            cancel: CancellationToken::new(),
            track_ended: CancellationToken::new(),
            gate: Arc::new(ReadinessGate::new()),
            relay_port: AtomicU16::new(0),
            shutdown_timeout,
            closed: AtomicBool::new(false),
            resources: Mutex::new(SessionResources::default()),
        }
    }

    // ── assembly (controller only) ──────────────────────────────────

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn gate_handle(&self) -> Arc<ReadinessGate> {
        Arc::clone(&self.gate)
    }

    pub(crate) fn attach_signaling(&mut self, signaling: Arc<dyn SignalingConnection>) {
        self.resources.get_mut().signaling = Some(signaling);
    }

    pub(crate) fn attach_port_lease(&mut self, lease: PortLease) {
        self.relay_port.store(lease.port(), Ordering::Release);
        self.resources.get_mut().port_lease = Some(lease);
    }

    pub(crate) fn attach_relay_socket(&mut self, socket: Arc<RelaySocket>) {
        self.resources.get_mut().relay_socket = Some(socket);
    }

    pub(crate) fn attach_transcoder(&mut self, process: Box<dyn TranscoderProcess>) {
        self.resources.get_mut().transcoder = Some(process);
    }

    pub(crate) fn attach_task(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.resources.get_mut().tasks.push((name, handle));
    }

    // ── accessors ───────────────────────────────────────────────────

    /// Remote endpoint identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Per-open identifier used in logs.
    pub fn talkback_id(&self) -> TalkbackId {
        self.talkback_id
    }

    /// Leased relay port, once one was acquired.
    pub fn relay_port(&self) -> Option<u16> {
        match self.relay_port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    /// Current transcoder readiness.
    pub fn readiness(&self) -> Readiness {
        self.gate.state()
    }

    /// Wait until the transcoder is ready or has failed.
    pub async fn wait_for_readiness(&self) -> Readiness {
        self.gate.wait().await
    }

    /// Like [`wait_for_readiness`](Self::wait_for_readiness), returning
    /// `Pending` if `timeout` passes first.
    pub async fn wait_ready(&self, timeout: Duration) -> Readiness {
        tokio::time::timeout(timeout, self.gate.wait())
            .await
            .unwrap_or(Readiness::Pending)
    }

    /// Cancelled once the inbound track stops delivering frames.
    pub fn track_ended(&self) -> CancellationToken {
        self.track_ended.clone()
    }

    /// Whether [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ── teardown ────────────────────────────────────────────────────

    /// Stop every task and release every handle.
    ///
    /// Safe to call repeatedly and from several tasks at once; the second
    /// caller waits for the first and finds nothing left to release.
    /// Handles go in reverse acquisition order after all tasks have stopped.
    pub async fn close(&self) {
        self.cancel.cancel();

        let mut resources = self.resources.lock().await;
        let tasks = std::mem::take(&mut resources.tasks);
        if !tasks.is_empty() {
            join_tasks(tasks, Instant::now() + self.shutdown_timeout).await;
        }

        if let Some(mut transcoder) = resources.transcoder.take() {
            transcoder.stop(self.shutdown_timeout).await;
        }
        drop(resources.relay_socket.take());
        if let Some(signaling) = resources.signaling.take() {
            signaling.close().await;
        }
        drop(resources.port_lease.take());
        drop(resources);

        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(
                session_id = %self.session_id,
                talkback_id = %self.talkback_id,
                "talkback session closed"
            );
        }
    }
}

/// Await `tasks` until `deadline`, aborting whatever is still running then.
async fn join_tasks(tasks: Vec<(&'static str, JoinHandle<()>)>, deadline: Instant) {
    for (name, mut handle) in tasks {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => debug!(task = name, "session task stopped"),
            Ok(Err(e)) => warn!(task = name, error = %e, "session task failed"),
            Err(_) => {
                warn!(task = name, "session task did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl std::fmt::Debug for TalkbackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TalkbackSession")
            .field("session_id", &self.session_id)
            .field("talkback_id", &self.talkback_id)
            .field("relay_port", &self.relay_port())
            .field("readiness", &self.readiness())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for TalkbackSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.closed.load(Ordering::Acquire) {
            warn!(session_id = %self.session_id, "talkback session dropped without close");
        }
    }
}
