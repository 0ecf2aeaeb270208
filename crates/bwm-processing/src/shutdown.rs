//! Session shutdown state machine
//!
//! `Running → ShutdownRequested → Terminated`. Every trigger (interrupt,
//! elapsed recording time, fatal error) funnels into [`ShutdownCoordinator::request`],
//! and exactly one caller is handed the teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use tokio::sync::Notify;
use tracing::{debug, info};

const RUNNING: u8 = 0;
const REQUESTED: u8 = 1;
const TERMINATED: u8 = 2;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShutdownRequested,
    Terminated,
}

/// Why the session is ending
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// User interrupt (Ctrl+C)
    Interrupt,
    /// Configured recording duration elapsed
    DurationElapsed,
    /// The sample source stopped or failed
    SourceFailure(String),
    /// Unexpected error in the session loop
    Error(String),
    /// Teardown started without an earlier trigger
    Teardown,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupted"),
            ShutdownReason::DurationElapsed => write!(f, "recording duration elapsed"),
            ShutdownReason::SourceFailure(reason) => write!(f, "source failure: {}", reason),
            ShutdownReason::Error(reason) => write!(f, "error: {}", reason),
            ShutdownReason::Teardown => write!(f, "teardown"),
        }
    }
}

/// Process-wide cooperative cancellation token with a one-shot teardown
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    teardown_claimed: AtomicBool,
    reason: OnceLock<ShutdownReason>,
    notify: Notify,
}

/// Exclusive right to run the teardown sequence
///
/// Completing or dropping the guard moves the coordinator to `Terminated`.
#[must_use = "dropping the guard immediately marks the session terminated"]
#[derive(Debug)]
pub struct TeardownGuard<'a> {
    coordinator: &'a ShutdownCoordinator,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; returns true only for the call that made the transition
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let transitioned = self
            .state
            .compare_exchange(RUNNING, REQUESTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if transitioned {
            info!(%reason, "Shutdown requested");
            let _ = self.reason.set(reason);
            self.notify.notify_waiters();
        } else {
            debug!(%reason, "Shutdown already in progress");
        }

        transitioned
    }

    /// Claim the teardown; `None` for every caller but the first
    pub fn begin_teardown(&self) -> Option<TeardownGuard<'_>> {
        self.request(ShutdownReason::Teardown);

        if self.teardown_claimed.swap(true, Ordering::AcqRel) {
            return None;
        }

        Some(TeardownGuard { coordinator: self })
    }

    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => ShutdownState::Running,
            REQUESTED => ShutdownState::ShutdownRequested,
            _ => ShutdownState::Terminated,
        }
    }

    /// Polled by every loop that must stop cooperatively
    pub fn is_shutdown_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::Acquire) == TERMINATED
    }

    /// Reason recorded by the first request
    pub fn reason(&self) -> Option<&ShutdownReason> {
        self.reason.get()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait_requested(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent request is not missed
            notified.as_mut().enable();

            if self.is_shutdown_requested() {
                return;
            }
            notified.await;
        }
    }

    fn mark_terminated(&self) {
        self.state.store(TERMINATED, Ordering::Release);
        info!("Session terminated");
    }
}

impl TeardownGuard<'_> {
    /// Finish teardown and move to `Terminated`
    pub fn complete(self) {
        // Drop does the transition
    }
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.mark_terminated();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::ScriptedWriter;
    use crate::sink::{Publisher, ResultSink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_initial_state() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert!(!coordinator.is_shutdown_requested());
        assert!(coordinator.reason().is_none());
    }

    #[test]
    fn test_request_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();

        assert!(coordinator.request(ShutdownReason::Interrupt));
        assert!(!coordinator.request(ShutdownReason::DurationElapsed));
        assert!(!coordinator.request(ShutdownReason::Interrupt));

        assert_eq!(coordinator.state(), ShutdownState::ShutdownRequested);
        assert_eq!(coordinator.reason(), Some(&ShutdownReason::Interrupt));
    }

    #[test]
    fn test_teardown_lifecycle() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request(ShutdownReason::DurationElapsed);

        let guard = coordinator.begin_teardown().unwrap();
        assert!(coordinator.begin_teardown().is_none());
        assert_eq!(coordinator.state(), ShutdownState::ShutdownRequested);

        guard.complete();
        assert_eq!(coordinator.state(), ShutdownState::Terminated);

        // Terminated is final
        assert!(!coordinator.request(ShutdownReason::Interrupt));
        assert!(coordinator.begin_teardown().is_none());
        assert!(coordinator.is_terminated());
    }

    #[test]
    fn test_teardown_without_request() {
        let coordinator = ShutdownCoordinator::new();
        let guard = coordinator.begin_teardown();

        assert!(guard.is_some());
        assert_eq!(coordinator.reason(), Some(&ShutdownReason::Teardown));
    }

    #[test]
    fn test_concurrent_triggers_tear_down_once() {
        let coordinator = ShutdownCoordinator::new();
        let writer = ScriptedWriter::default();
        let (publisher, _receiver) = Publisher::channel();
        let sink = Mutex::new(ResultSink::new(Box::new(writer.clone()), publisher));
        let teardowns = AtomicUsize::new(0);
        let transitions = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for i in 0..16 {
                let coordinator = &coordinator;
                let sink = &sink;
                let teardowns = &teardowns;
                let transitions = &transitions;
                scope.spawn(move || {
                    let reason = if i % 2 == 0 {
                        ShutdownReason::Interrupt
                    } else {
                        ShutdownReason::DurationElapsed
                    };
                    if coordinator.request(reason) {
                        transitions.fetch_add(1, Ordering::SeqCst);
                    }
                    if let Some(guard) = coordinator.begin_teardown() {
                        teardowns.fetch_add(1, Ordering::SeqCst);
                        sink.lock().unwrap().close().unwrap();
                        guard.complete();
                    }
                });
            }
        });

        assert_eq!(transitions.load(Ordering::SeqCst), 1);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn test_wait_requested_wakes() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_requested().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        coordinator.request(ShutdownReason::Interrupt);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_requested_after_request_returns() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request(ShutdownReason::DurationElapsed);
        coordinator.wait_requested().await;
    }
}
