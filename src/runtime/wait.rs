//! Single-slot rendezvous behind `AWAIT-SYNC` and `AWAIT-ANY`.
//!
//! A wait is armed by one clause and consumed by the runner before it
//! dispatches the next one. External signals (peer SYNC messages, local
//! events) resolve it; otherwise it times out.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Signal name that matches every wait.
pub const ANY_SIGNAL: &str = "Any";

/// What an armed wait is listening for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitTarget {
    /// Released by any signal.
    Any,
    /// Released only by the named signal.
    Named(String),
}

impl WaitTarget {
    /// `"Any"` (case-insensitive) becomes [`WaitTarget::Any`].
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(ANY_SIGNAL) {
            WaitTarget::Any
        } else {
            WaitTarget::Named(name.to_string())
        }
    }

    /// Whether `signal` releases this wait.
    pub fn matches(&self, signal: &str) -> bool {
        match self {
            WaitTarget::Any => true,
            WaitTarget::Named(name) => name == signal,
        }
    }
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTarget::Any => f.write_str(ANY_SIGNAL),
            WaitTarget::Named(name) => f.write_str(name),
        }
    }
}

/// How a suspension ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Nothing was armed (or the signal arrived before suspension began).
    NotArmed,
    /// Released by the given signal.
    Resolved(String),
    /// The deadline elapsed first.
    TimedOut,
    /// The run was canceled while suspended.
    Canceled,
    /// The slot was cleared or re-armed underneath the waiter.
    Superseded,
}

struct ArmedWait {
    target: WaitTarget,
    timeout: Duration,
    generation: u64,
    release: Option<oneshot::Sender<String>>,
    released: Option<oneshot::Receiver<String>>,
}

#[derive(Default)]
struct SlotState {
    armed: Option<ArmedWait>,
    generation: u64,
}

/// The per-runner wait slot. At most one wait is pending at a time.
#[derive(Default)]
pub struct WaitSlot {
    state: Mutex<SlotState>,
}

impl WaitSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot. Re-arming while a wait is pending replaces it; the
    /// previous waiter (if suspended) ends with [`WaitOutcome::Superseded`].
    pub fn arm(&self, target: WaitTarget, timeout: Duration) {
        let mut state = self.state.lock();
        if let Some(previous) = &state.armed {
            warn!(previous = %previous.target, next = %target, "re-arming a pending wait");
        }
        state.generation += 1;
        let generation = state.generation;
        let (release, released) = oneshot::channel();
        debug!(wait = %target, timeout_ms = timeout.as_millis() as u64, "wait armed");
        state.armed = Some(ArmedWait {
            target,
            timeout,
            generation,
            release: Some(release),
            released: Some(released),
        });
    }

    /// Deliver `signal`. Returns `true` if it released the pending wait.
    pub fn resolve(&self, signal: &str) -> bool {
        let mut state = self.state.lock();
        let matched = state
            .armed
            .as_ref()
            .is_some_and(|armed| armed.target.matches(signal));
        if !matched {
            return false;
        }
        if let Some(mut armed) = state.armed.take() {
            debug!(wait = %armed.target, signal, "wait resolved");
            if let Some(release) = armed.release.take() {
                // The waiter may not have suspended yet; that is fine.
                let _ = release.send(signal.to_string());
            }
        }
        true
    }

    /// Whether a wait is pending.
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    /// Target of the pending wait.
    pub fn pending(&self) -> Option<WaitTarget> {
        self.state.lock().armed.as_ref().map(|a| a.target.clone())
    }

    /// Drop any pending wait.
    pub fn clear(&self) {
        self.state.lock().armed = None;
    }

    /// Suspend until the pending wait resolves, times out, or `cancel` fires.
    pub async fn suspend(&self, cancel: &CancellationToken) -> WaitOutcome {
        let (released, timeout, generation, target) = {
            let mut state = self.state.lock();
            let Some(armed) = state.armed.as_mut() else {
                return WaitOutcome::NotArmed;
            };
            let Some(released) = armed.released.take() else {
                warn!(wait = %armed.target, "wait already has a suspended waiter");
                return WaitOutcome::Superseded;
            };
            (released, armed.timeout, armed.generation, armed.target.clone())
        };

        tokio::select! {
            result = released => match result {
                Ok(signal) => WaitOutcome::Resolved(signal),
                Err(_) => WaitOutcome::Superseded,
            },
            _ = tokio::time::sleep(timeout) => {
                self.clear_generation(generation);
                info!(wait = %target, timeout_ms = timeout.as_millis() as u64, "wait timed out");
                WaitOutcome::TimedOut
            }
            _ = cancel.cancelled() => {
                self.clear_generation(generation);
                WaitOutcome::Canceled
            }
        }
    }

    fn clear_generation(&self, generation: u64) {
        let mut state = self.state.lock();
        if state
            .armed
            .as_ref()
            .is_some_and(|armed| armed.generation == generation)
        {
            state.armed = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn resolve_requires_matching_name() {
        let slot = WaitSlot::new();
        assert!(!slot.resolve("foo"));

        slot.arm(WaitTarget::Named("foo".into()), Duration::from_secs(1));
        assert!(!slot.resolve("bar"));
        assert!(slot.is_armed());
        assert!(slot.resolve("foo"));
        assert!(!slot.is_armed());
    }

    #[test]
    fn any_matches_every_signal() {
        let slot = WaitSlot::new();
        slot.arm(WaitTarget::from_name("any"), Duration::from_secs(1));
        assert_eq!(slot.pending(), Some(WaitTarget::Any));
        assert!(slot.resolve("whatever"));
    }

    #[tokio::test]
    async fn suspend_returns_on_resolve() {
        let slot = Arc::new(WaitSlot::new());
        slot.arm(WaitTarget::Named("foo".into()), Duration::from_secs(5));

        let signaller = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(!signaller.resolve("bar"));
            assert!(signaller.resolve("foo"));
        });

        let started = Instant::now();
        let outcome = slot.suspend(&CancellationToken::new()).await;
        assert_eq!(outcome, WaitOutcome::Resolved("foo".into()));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn suspend_times_out_and_clears() {
        let slot = WaitSlot::new();
        slot.arm(WaitTarget::Named("foo".into()), Duration::from_millis(30));
        let outcome = slot.suspend(&CancellationToken::new()).await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(!slot.is_armed());
    }

    #[tokio::test]
    async fn signal_before_suspension_releases_immediately() {
        let slot = WaitSlot::new();
        slot.arm(WaitTarget::Any, Duration::from_secs(5));
        assert!(slot.resolve("early"));
        assert_eq!(
            slot.suspend(&CancellationToken::new()).await,
            WaitOutcome::NotArmed
        );
    }

    #[tokio::test]
    async fn cancellation_ends_suspension() {
        let slot = WaitSlot::new();
        slot.arm(WaitTarget::Any, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(slot.suspend(&cancel).await, WaitOutcome::Canceled);
        assert!(!slot.is_armed());
    }
}
