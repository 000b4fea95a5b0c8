//! Per-character state shared by the verb handlers.
//!
//! One `Performer` exists per character. It replaces what would otherwise be
//! process-wide flags: display layer visibility, the wait slot, the current
//! volume and the head-follow task.

use super::EngineConfig;
use super::fanout::{PeerRegistry, PeerTarget, Relay};
use super::follow::HeadFollow;
use super::triggers::TriggerBoard;
use super::wait::WaitSlot;
use crate::capability::Capabilities;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Layers the script made visible during the current run.
#[derive(Debug, Default)]
pub struct DisplayLayers {
    shown: Mutex<BTreeSet<String>>,
}

impl DisplayLayers {
    /// Record `layer` as shown; returns `true` the first time.
    pub fn mark_shown(&self, layer: &str) -> bool {
        self.shown.lock().insert(layer.to_string())
    }

    /// Forget `layer`.
    pub fn forget(&self, layer: &str) {
        self.shown.lock().remove(layer);
    }

    /// Whether `layer` is currently shown.
    pub fn is_shown(&self, layer: &str) -> bool {
        self.shown.lock().contains(layer)
    }

    /// Take every shown layer, leaving none recorded.
    pub fn take_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.shown.lock()).into_iter().collect()
    }
}

/// Capabilities plus the mutable per-character state scripts act on.
pub struct Performer {
    config: EngineConfig,
    capabilities: Capabilities,
    wait: Arc<WaitSlot>,
    follow: HeadFollow,
    layers: DisplayLayers,
    volume: AtomicU8,
    peers: RwLock<PeerRegistry>,
    relay: Relay,
    heard: Arc<Mutex<Option<String>>>,
    listening: Mutex<Option<CancellationToken>>,
    triggers: RwLock<Option<Arc<TriggerBoard>>>,
}

impl Performer {
    /// Create a performer for `config` acting through `capabilities`.
    pub fn new(config: EngineConfig, capabilities: Capabilities) -> Self {
        let relay = Relay::new(capabilities.transport.clone(), config.relay_endpoints());
        let follow = HeadFollow::new(capabilities.movement.clone(), config.follow.clone());
        Self {
            wait: Arc::new(WaitSlot::new()),
            layers: DisplayLayers::default(),
            volume: AtomicU8::new(config.default_volume.min(100)),
            peers: RwLock::new(config.peer_registry()),
            relay,
            follow,
            heard: Arc::new(Mutex::new(None)),
            listening: Mutex::new(None),
            triggers: RwLock::new(None),
            capabilities,
            config,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Capability handles.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The wait slot consulted before each clause.
    pub fn wait_slot(&self) -> &Arc<WaitSlot> {
        &self.wait
    }

    /// Head-follow controller.
    pub fn follow(&self) -> &HeadFollow {
        &self.follow
    }

    /// Display layer bookkeeping.
    pub fn layers(&self) -> &DisplayLayers {
        &self.layers
    }

    /// Current default volume.
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Set the default volume, clamped to 100.
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        debug!(volume, "volume changed");
        self.volume.store(volume, Ordering::Relaxed);
    }

    /// Replace the known peers.
    pub fn set_peers(&self, peers: Vec<super::fanout::Peer>) {
        self.peers.write().set_peers(peers);
    }

    /// Resolve a relay target set against the current peers.
    pub fn resolve_peers(&self, overrides: Option<&[String]>, include_self: bool) -> Vec<PeerTarget> {
        self.peers.read().resolve(overrides, include_self)
    }

    /// Fan-out relay.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Route background results (speech captured by `LISTEN`) to `board`.
    pub fn attach_triggers(&self, board: Arc<TriggerBoard>) {
        *self.triggers.write() = Some(board);
    }

    /// Trigger board attached with [`Performer::attach_triggers`].
    pub fn triggers(&self) -> Option<Arc<TriggerBoard>> {
        self.triggers.read().clone()
    }

    /// Transcript of the most recent background capture.
    pub fn last_transcript(&self) -> Option<String> {
        self.heard.lock().clone()
    }

    /// Shared slot background captures write their transcript to.
    pub(crate) fn transcript_slot(&self) -> Arc<Mutex<Option<String>>> {
        self.heard.clone()
    }

    /// Start a new capture scope under `run`. A capture still pending from an
    /// earlier `LISTEN` is abandoned.
    pub(crate) fn begin_listening(&self, run: &CancellationToken) -> CancellationToken {
        let token = run.child_token();
        if let Some(previous) = self.listening.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}
