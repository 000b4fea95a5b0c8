//! Script lifecycle events published by the runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Identifier of one script run.
pub type RunId = Uuid;

/// Lifecycle transition of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptEventKind {
    /// The run was accepted and is starting.
    Started,
    /// A repeat pass is about to begin.
    Repeating,
    /// A full pass over the main clauses finished.
    PassComplete,
    /// The loop exited after at least one full pass.
    Completed,
    /// The run was canceled before finishing a pass.
    Canceled,
    /// The run aborted on a failed clause.
    Failed,
    /// An explicit stop ran the completion clauses.
    Stopped,
}

/// Event emitted on the runner's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// Run the event belongs to.
    pub run_id: RunId,
    /// Transition.
    pub kind: ScriptEventKind,
    /// Loop pass the event refers to (0 before the first pass).
    pub loop_index: u32,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Broadcast publisher for lifecycle events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScriptEvent>,
}

impl EventBus {
    /// Create a bus retaining up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScriptEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error.
    pub fn emit(&self, run_id: RunId, kind: ScriptEventKind, loop_index: u32) {
        trace!(%run_id, ?kind, loop_index, "script event");
        let _ = self.sender.send(ScriptEvent {
            run_id,
            kind,
            loop_index,
            at: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
