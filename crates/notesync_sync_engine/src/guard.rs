//! Single-flight guard for synchronizations.
//!
//! At most one synchronization runs per process. A second attempt is
//! rejected, never queued. The guard also remembers whether a run is parked
//! while the user completes an external authorization; only a resume may
//! start a run in that situation.

use notesync_core::{now, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// What caused a synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    /// Automatic run after the application started.
    AtStartup,
    /// Explicitly requested by the user.
    Manually,
    /// Automatic run before the application shuts down.
    AtShutdown,
}

impl SyncTrigger {
    /// Returns true if subscribers hear about runs with this trigger.
    ///
    /// The shutdown run happens while the UI is gone.
    pub fn notifies(self) -> bool {
        matches!(self, SyncTrigger::AtStartup | SyncTrigger::Manually)
    }
}

/// State of the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No synchronization is running.
    Idle,
    /// A synchronization is running.
    Running(SyncTrigger),
}

/// Event sent to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStateEvent {
    /// A synchronization started.
    Started(SyncTrigger),
    /// A synchronization finished.
    Stopped(SyncTrigger),
}

#[derive(Debug)]
struct GuardState {
    state: SyncState,
    awaiting_continuation: bool,
    last_finished_at: Option<Timestamp>,
}

/// Shared guard, handed around as `Arc<SyncStateGuard>`.
pub struct SyncStateGuard {
    inner: Mutex<GuardState>,
    subscribers: RwLock<Vec<Sender<SyncStateEvent>>>,
}

impl SyncStateGuard {
    /// Creates an idle guard.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GuardState {
                state: SyncState::Idle,
                awaiting_continuation: false,
                last_finished_at: None,
            }),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        self.inner.lock().state
    }

    /// Returns true if a synchronization is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), SyncState::Running(_))
    }

    /// Returns when the last synchronization finished.
    pub fn last_finished_at(&self) -> Option<Timestamp> {
        self.inner.lock().last_finished_at
    }

    /// Tries to start a synchronization.
    ///
    /// Returns false, without changing anything, if a synchronization is
    /// running or a parked one awaits its continuation.
    pub fn try_start(&self, trigger: SyncTrigger) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SyncState::Idle || inner.awaiting_continuation {
            debug!(?trigger, state = ?inner.state, awaiting = inner.awaiting_continuation, "sync start rejected");
            return false;
        }
        inner.state = SyncState::Running(trigger);
        if trigger.notifies() {
            self.emit(SyncStateEvent::Started(trigger));
        }
        true
    }

    /// Resumes a parked synchronization.
    ///
    /// Only succeeds while awaiting a continuation; clears the flag.
    pub fn try_resume(&self, trigger: SyncTrigger) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SyncState::Idle || !inner.awaiting_continuation {
            return false;
        }
        inner.awaiting_continuation = false;
        inner.state = SyncState::Running(trigger);
        if trigger.notifies() {
            self.emit(SyncStateEvent::Started(trigger));
        }
        true
    }

    /// Marks the running synchronization as finished.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let SyncState::Running(trigger) = inner.state {
            inner.state = SyncState::Idle;
            inner.last_finished_at = Some(now());
            if trigger.notifies() {
                self.emit(SyncStateEvent::Stopped(trigger));
            }
        }
    }

    /// Sets whether a synchronization is parked until an external
    /// continuation arrives.
    pub fn set_awaiting_continuation(&self, awaiting: bool) {
        self.inner.lock().awaiting_continuation = awaiting;
    }

    /// Returns true while a parked synchronization awaits its continuation.
    pub fn is_awaiting_continuation(&self) -> bool {
        self.inner.lock().awaiting_continuation
    }

    /// Subscribes to start/stop events.
    pub fn subscribe(&self) -> Receiver<SyncStateEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.write().push(sender);
        receiver
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn emit(&self, event: SyncStateEvent) {
        // Dropped receivers are removed on the way.
        self.subscribers
            .write()
            .retain(|sender| sender.send(event).is_ok());
    }
}

impl Default for SyncStateGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncStateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateGuard")
            .field("state", &self.state())
            .field("awaiting_continuation", &self.is_awaiting_continuation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn start_and_stop() {
        let guard = SyncStateGuard::new();
        assert_eq!(guard.state(), SyncState::Idle);
        assert!(guard.last_finished_at().is_none());

        assert!(guard.try_start(SyncTrigger::Manually));
        assert_eq!(guard.state(), SyncState::Running(SyncTrigger::Manually));
        assert!(!guard.try_start(SyncTrigger::Manually));

        guard.stop();
        assert!(!guard.is_running());
        assert!(guard.last_finished_at().is_some());
    }

    #[test]
    fn concurrent_starts_admit_exactly_one() {
        for _ in 0..50 {
            let guard = Arc::new(SyncStateGuard::new());
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [SyncTrigger::AtStartup, SyncTrigger::Manually]
                .into_iter()
                .map(|trigger| {
                    let guard = Arc::clone(&guard);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        guard.try_start(trigger)
                    })
                })
                .collect();

            let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results.iter().filter(|started| **started).count(), 1);
        }
    }

    #[test]
    fn awaiting_continuation_blocks_new_runs() {
        let guard = SyncStateGuard::new();
        assert!(guard.try_start(SyncTrigger::Manually));
        guard.set_awaiting_continuation(true);
        guard.stop();

        assert!(!guard.try_start(SyncTrigger::AtStartup));
        assert!(guard.is_awaiting_continuation());

        assert!(guard.try_resume(SyncTrigger::Manually));
        assert!(!guard.is_awaiting_continuation());
        assert!(!guard.try_resume(SyncTrigger::Manually));
    }

    #[test]
    fn resume_requires_parked_run() {
        let guard = SyncStateGuard::new();
        assert!(!guard.try_resume(SyncTrigger::Manually));
        assert!(!guard.is_running());
    }

    #[test]
    fn shutdown_runs_are_not_announced() {
        let guard = SyncStateGuard::new();
        let events = guard.subscribe();

        assert!(guard.try_start(SyncTrigger::AtShutdown));
        guard.stop();
        assert!(events.try_recv().is_err());

        assert!(guard.try_start(SyncTrigger::Manually));
        guard.stop();
        assert_eq!(
            events.try_recv().unwrap(),
            SyncStateEvent::Started(SyncTrigger::Manually)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SyncStateEvent::Stopped(SyncTrigger::Manually)
        );
    }

    #[test]
    fn dropped_subscribers_are_removed() {
        let guard = SyncStateGuard::new();
        let events = guard.subscribe();
        drop(guard.subscribe());
        assert_eq!(guard.subscriber_count(), 2);

        assert!(guard.try_start(SyncTrigger::AtStartup));
        assert_eq!(guard.subscriber_count(), 1);
        assert!(events.try_recv().is_ok());
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let guard = SyncStateGuard::new();
        guard.stop();
        assert!(guard.last_finished_at().is_none());
    }
}
