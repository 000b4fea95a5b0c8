//! Armed-trigger aggregator consulted by the interaction layer.
//!
//! The board holds the triggers that may currently advance the conversation.
//! Compound updates (insert-else-replace, bulk clear) run under one coarse lock.
//! Triggers armed with a timeout own a watchdog task that is canceled whenever
//! the trigger is replaced or cleared.

use super::events::{ScriptEvent, ScriptEventKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Kind of event a trigger listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Speech was recognized.
    SpeechHeard,
    /// A bump sensor was pressed.
    BumperPressed,
    /// A capacitive touch sensor was touched.
    CapTouch,
    /// A face was recognized.
    FaceRecognized,
    /// An object was detected.
    ObjectSeen,
    /// A timer elapsed.
    Timeout,
    /// An animation script finished.
    ScriptCompleted,
    /// A peer sent an EVENT.
    ExternalEvent,
    /// A named sync signal arrived.
    SyncEvent,
}

/// A trigger currently armed on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedTrigger {
    /// Trigger name (board key).
    pub name: String,
    /// Event kind.
    pub kind: TriggerKind,
    /// Filter; empty or `*` matches anything.
    pub filter: String,
    /// Survives [`TriggerBoard::clear_except_keep_alive`].
    pub keep_alive: bool,
}

impl ArmedTrigger {
    /// Create a trigger.
    pub fn new(name: impl Into<String>, kind: TriggerKind, filter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            filter: filter.into(),
            keep_alive: false,
        }
    }

    /// Mark the trigger keep-alive.
    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }

    /// Whether `event` satisfies this trigger.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        if self.kind != event.kind {
            return false;
        }
        let filter = self.filter.trim();
        filter.is_empty()
            || filter == "*"
            || event
                .text
                .to_ascii_lowercase()
                .contains(&filter.to_ascii_lowercase())
    }
}

/// Incoming event offered to the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event kind.
    pub kind: TriggerKind,
    /// Event text (transcript, sensor name, label, ...).
    pub text: String,
}

impl TriggerEvent {
    /// Create an event.
    pub fn new(kind: TriggerKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// A trigger that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMatch {
    /// The trigger that matched.
    pub trigger: ArmedTrigger,
    /// The event that satisfied it.
    pub event: TriggerEvent,
}

struct Entry {
    trigger: ArmedTrigger,
    watchdog: Option<CancellationToken>,
}

impl Entry {
    fn disarm(self) -> ArmedTrigger {
        if let Some(watchdog) = self.watchdog {
            watchdog.cancel();
        }
        self.trigger
    }
}

/// Concurrent map of armed triggers.
pub struct TriggerBoard {
    entries: Mutex<HashMap<String, Entry>>,
    matches: mpsc::UnboundedSender<TriggerMatch>,
}

impl TriggerBoard {
    /// Create a board; matches from watchdogs and script completions are sent
    /// on the returned receiver.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TriggerMatch>) {
        let (matches, receiver) = mpsc::unbounded_channel();
        let board = Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            matches,
        });
        (board, receiver)
    }

    /// Arm `trigger`, replacing any trigger with the same name. With a
    /// `timeout`, a watchdog fires a [`TriggerKind::Timeout`] match if the
    /// trigger is still armed when it elapses.
    pub fn arm(self: &Arc<Self>, trigger: ArmedTrigger, timeout: Option<Duration>) {
        let mut entries = self.entries.lock();
        let watchdog = timeout.map(|timeout| self.spawn_watchdog(trigger.name.clone(), timeout));
        debug!(trigger = %trigger.name, kind = ?trigger.kind, "trigger armed");
        if let Some(previous) = entries.insert(trigger.name.clone(), Entry { trigger, watchdog }) {
            previous.disarm();
        }
    }

    /// Remove a trigger.
    pub fn disarm(&self, name: &str) -> Option<ArmedTrigger> {
        self.entries.lock().remove(name).map(Entry::disarm)
    }

    /// Whether a trigger with `name` is armed.
    pub fn is_armed(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Currently armed triggers, sorted by name.
    pub fn snapshot(&self) -> Vec<ArmedTrigger> {
        let mut triggers: Vec<_> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.trigger.clone())
            .collect();
        triggers.sort_by(|a, b| a.name.cmp(&b.name));
        triggers
    }

    /// Remove every trigger not marked keep-alive; returns how many were removed.
    pub fn clear_except_keep_alive(&self) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.trigger.keep_alive)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &doomed {
            if let Some(entry) = entries.remove(name) {
                entry.disarm();
            }
        }
        doomed.len()
    }

    /// Offer an event. The first matching trigger (by name order) is consumed
    /// unless keep-alive, and returned.
    pub fn offer(&self, event: TriggerEvent) -> Option<TriggerMatch> {
        let mut entries = self.entries.lock();
        let mut names: Vec<&String> = entries
            .iter()
            .filter(|(_, entry)| entry.trigger.matches(&event))
            .map(|(name, _)| name)
            .collect();
        names.sort();
        let name = names.first().map(|name| (*name).clone())?;

        let trigger = if entries.get(&name).is_some_and(|e| e.trigger.keep_alive) {
            entries.get(&name).map(|e| e.trigger.clone())?
        } else {
            entries.remove(&name).map(Entry::disarm)?
        };
        info!(trigger = %trigger.name, kind = ?event.kind, "trigger matched");
        Some(TriggerMatch { trigger, event })
    }

    /// Offer `event` and forward any match to the board's receiver. Returns
    /// whether a trigger fired.
    pub fn deliver(&self, event: TriggerEvent) -> bool {
        match self.offer(event) {
            Some(found) => {
                let _ = self.matches.send(found);
                true
            }
            None => false,
        }
    }

    /// Forward script completions from a runner as
    /// [`TriggerKind::ScriptCompleted`] events until the channel closes.
    pub async fn watch_scripts(self: Arc<Self>, mut events: broadcast::Receiver<ScriptEvent>) {
        loop {
            match events.recv().await {
                Ok(ScriptEvent {
                    kind: ScriptEventKind::Completed | ScriptEventKind::Stopped,
                    run_id,
                    ..
                }) => {
                    self.deliver(TriggerEvent::new(
                        TriggerKind::ScriptCompleted,
                        run_id.to_string(),
                    ));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "trigger board lagged behind script events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn spawn_watchdog(self: &Arc<Self>, name: String, timeout: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let board = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let Some(board) = board.upgrade() else { return };
                    let fired = {
                        let mut entries = board.entries.lock();
                        // Re-check under the lock: a concurrent replace cancels us first.
                        if token.is_cancelled() {
                            None
                        } else {
                            entries.remove(&name).map(|entry| entry.trigger)
                        }
                    };
                    if let Some(trigger) = fired {
                        info!(trigger = %trigger.name, "trigger timed out");
                        let event = TriggerEvent::new(TriggerKind::Timeout, trigger.name.clone());
                        let _ = board.matches.send(TriggerMatch { trigger, event });
                    }
                }
            }
        });
        cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_match_case_insensitively() {
        let trigger = ArmedTrigger::new("yes", TriggerKind::SpeechHeard, "Yes");
        assert!(trigger.matches(&TriggerEvent::new(TriggerKind::SpeechHeard, "oh yes please")));
        assert!(!trigger.matches(&TriggerEvent::new(TriggerKind::SpeechHeard, "no")));
        assert!(!trigger.matches(&TriggerEvent::new(TriggerKind::BumperPressed, "yes")));

        let wildcard = ArmedTrigger::new("any", TriggerKind::BumperPressed, "*");
        assert!(wildcard.matches(&TriggerEvent::new(TriggerKind::BumperPressed, "front-left")));
    }

    #[tokio::test]
    async fn arm_replaces_and_offer_consumes() {
        let (board, _rx) = TriggerBoard::new();
        board.arm(ArmedTrigger::new("t", TriggerKind::SpeechHeard, "hello"), None);
        board.arm(ArmedTrigger::new("t", TriggerKind::SpeechHeard, "bye"), None);
        assert_eq!(board.snapshot().len(), 1);

        assert!(board.offer(TriggerEvent::new(TriggerKind::SpeechHeard, "hello")).is_none());
        let found = board
            .offer(TriggerEvent::new(TriggerKind::SpeechHeard, "bye now"))
            .unwrap();
        assert_eq!(found.trigger.filter, "bye");
        assert!(!board.is_armed("t"));
    }

    #[tokio::test]
    async fn keep_alive_survives_offer_and_clear() {
        let (board, _rx) = TriggerBoard::new();
        board.arm(
            ArmedTrigger::new("bump", TriggerKind::BumperPressed, "").keep_alive(),
            None,
        );
        board.arm(ArmedTrigger::new("hi", TriggerKind::SpeechHeard, "hi"), None);

        assert!(board.offer(TriggerEvent::new(TriggerKind::BumperPressed, "rear")).is_some());
        assert!(board.is_armed("bump"));
        assert_eq!(board.clear_except_keep_alive(), 1);
        assert_eq!(board.snapshot(), vec![
            ArmedTrigger::new("bump", TriggerKind::BumperPressed, "").keep_alive()
        ]);
    }

    #[tokio::test]
    async fn watchdog_fires_unless_disarmed() {
        let (board, mut rx) = TriggerBoard::new();
        board.arm(
            ArmedTrigger::new("slow", TriggerKind::SpeechHeard, ""),
            Some(Duration::from_millis(20)),
        );
        board.arm(
            ArmedTrigger::new("quick", TriggerKind::SpeechHeard, ""),
            Some(Duration::from_millis(20)),
        );
        board.disarm("quick");

        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired.trigger.name, "slow");
        assert_eq!(fired.event.kind, TriggerKind::Timeout);
        assert!(!board.is_armed("slow"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());
    }
}
