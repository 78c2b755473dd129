//! One-shot readiness latch between the transcoder and the track relay.
//!
//! Backed by a `watch` channel: any number of readers may call
//! [`ReadinessGate::is_open`] while the diagnostic scanner flips it. The
//! state only ever moves `Pending -> Ready` or `Pending -> Failed`.

use tokio::sync::watch;

/// Transcoder readiness as seen by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// The transcoder has not reported readiness yet; audio is dropped.
    Pending,
    /// The transcoder is consuming input; audio is forwarded.
    Ready,
    /// The transcoder went away before becoming ready.
    Failed,
}

/// Single-writer, multi-reader readiness latch.
#[derive(Debug)]
pub struct ReadinessGate {
    state: watch::Sender<Readiness>,
}

impl ReadinessGate {
    /// Create a gate in the `Pending` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(Readiness::Pending);
        Self { state }
    }

    /// Move `Pending -> Ready`. Returns `true` only for the call that
    /// performed the transition.
    pub fn open(&self) -> bool {
        self.settle(Readiness::Ready)
    }

    /// Move `Pending -> Failed`. Returns `true` only for the call that
    /// performed the transition.
    pub fn fail(&self) -> bool {
        self.settle(Readiness::Failed)
    }

    fn settle(&self, to: Readiness) -> bool {
        self.state.send_if_modified(|current| {
            if *current == Readiness::Pending {
                *current = to;
                true
            } else {
                false
            }
        })
    }

    /// Current state.
    pub fn state(&self) -> Readiness {
        *self.state.borrow()
    }

    /// Whether audio may be forwarded.
    pub fn is_open(&self) -> bool {
        self.state() == Readiness::Ready
    }

    /// Resolve once the gate has left `Pending`.
    pub async fn wait(&self) -> Readiness {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| *s != Readiness::Pending).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_pending_and_closed() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.state(), Readiness::Pending);
        assert!(!gate.is_open());
    }

    #[test]
    fn open_transitions_once() {
        let gate = ReadinessGate::new();
        assert!(gate.open());
        assert!(!gate.open());
        assert!(gate.is_open());
    }

    #[test]
    fn ready_never_becomes_failed() {
        let gate = ReadinessGate::new();
        assert!(gate.open());
        assert!(!gate.fail());
        assert_eq!(gate.state(), Readiness::Ready);
    }

    #[test]
    fn failed_never_becomes_ready() {
        let gate = ReadinessGate::new();
        assert!(gate.fail());
        assert!(!gate.open());
        assert_eq!(gate.state(), Readiness::Failed);
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn wait_resolves_on_open() {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(gate.open());
        assert_eq!(waiter.await.unwrap(), Readiness::Ready);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_settled() {
        let gate = ReadinessGate::new();
        assert!(gate.fail());
        assert_eq!(gate.wait().await, Readiness::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_openers_only_one_wins() {
        let gate = Arc::new(ReadinessGate::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.open() })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(gate.is_open());
    }
}
