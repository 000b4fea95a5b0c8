//! Engine state, configuration and the services scripts run against
//!
//! This module provides `EngineConfig`, the per-character `Performer` that
//! owns the wait slot, head-follow task and fan-out relay, and the trigger
//! board consumed by the outer interaction layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Submodules
pub mod context;
pub mod error;
pub mod events;
pub mod fanout;
pub mod follow;
pub mod performer;
pub mod storage;
pub mod triggers;
pub mod wait;

/// Display layer ids the script display verbs draw on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNames {
    /// Layer for `TEXT`
    pub text: String,
    /// Layer for `IMAGE` and `IMAGE-URL`
    pub image: String,
    /// Layer for `VIDEO`
    pub video: String,
    /// Layer for `WEB`
    pub web: String,
}

impl Default for LayerNames {
    fn default() -> Self {
        Self {
            text: "ChoreoText".to_string(),
            image: "ChoreoImage".to_string(),
            video: "ChoreoVideo".to_string(),
            web: "ChoreoWeb".to_string(),
        }
    }
}

/// Configuration for one character's script engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name sent as `origin` on relayed payloads
    pub robot_name: String,

    /// This robot's own address, used to exclude self from fan-out
    pub self_ip: Option<String>,

    /// Abort the whole run when a clause fails
    pub stop_on_failed_command: bool,

    /// Volume used by speech and audio when the animation sets none (0-100)
    pub default_volume: u8,

    /// Port peers listen on
    pub peer_port: u16,

    /// Peer path for relayed commands
    pub command_path: String,

    /// Peer path for sync signals
    pub sync_path: String,

    /// Peer path for events
    pub event_path: String,

    /// Per-request timeout for peer posts
    pub ack_timeout_ms: u64,

    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,

    /// Known peers
    pub peers: Vec<Peer>,

    /// Display layer ids
    pub layers: LayerNames,

    /// Head-follow tuning
    pub follow: FollowConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            robot_name: "choreo".to_string(),
            self_ip: None,
            stop_on_failed_command: false,
            default_volume: 20,
            peer_port: 80,
            command_path: "/api/choreo/command".to_string(),
            sync_path: "/api/choreo/sync".to_string(),
            event_path: "/api/choreo/event".to_string(),
            ack_timeout_ms: 3000,
            event_capacity: 64,
            peers: Vec::new(),
            layers: LayerNames::default(),
            follow: FollowConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Endpoint layout used when relaying to peers
    pub fn relay_endpoints(&self) -> RelayEndpoints {
        RelayEndpoints {
            origin: self.robot_name.clone(),
            port: self.peer_port,
            command_path: self.command_path.clone(),
            sync_path: self.sync_path.clone(),
            event_path: self.event_path.clone(),
        }
    }

    /// Peer registry seeded from `peers` and `self_ip`
    pub fn peer_registry(&self) -> PeerRegistry {
        PeerRegistry::new(self.peers.clone(), self.self_ip.clone())
    }

    /// Timeout for awaited peer posts
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

// Re-export commonly used types
pub use context::{AnimationContext, InteractionContext};
pub use error::{DispatchError, EngineError};
pub use events::{EventBus, RunId, ScriptEvent, ScriptEventKind};
pub use fanout::{FanoutReport, Peer, PeerRegistry, PeerTarget, Relay, RelayEndpoints, RelayPayload};
pub use follow::{Detection, FollowConfig, FollowTarget, HeadFollow};
pub use performer::Performer;
pub use triggers::{ArmedTrigger, TriggerBoard, TriggerEvent, TriggerKind, TriggerMatch};
pub use wait::{WaitOutcome, WaitSlot, WaitTarget};
