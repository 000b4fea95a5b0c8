//! Cross-device fan-out of commands, sync signals and events.
//!
//! Delivery is best-effort HTTP POST. An acknowledgement only means the peer's
//! HTTP layer accepted the payload.

use crate::capability::PeerTransport;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// A known peer robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer name used by `[name,...]` overrides.
    pub name: String,
    /// Addresses the peer answers on; the first one is used for relays.
    pub ip_address_list: Vec<String>,
}

impl Peer {
    /// Create a peer with a single address.
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address_list: vec![ip.into()],
        }
    }

    /// Address relays are sent to.
    pub fn primary_address(&self) -> Option<&str> {
        self.ip_address_list.first().map(String::as_str)
    }

    /// Whether `ip` is one of this peer's addresses.
    pub fn has_address(&self, ip: &str) -> bool {
        self.ip_address_list.iter().any(|addr| addr == ip)
    }
}

/// Resolved relay target. Override names that match no known peer stay in
/// the target list as `Unresolved` and are reported, not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerTarget {
    /// A known peer.
    Known(Peer),
    /// An override name with no matching peer.
    Unresolved(String),
}

/// Externally supplied peer list plus this robot's own address.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
    self_ip: Option<String>,
}

impl PeerRegistry {
    /// Create a registry.
    pub fn new(peers: Vec<Peer>, self_ip: Option<String>) -> Self {
        Self { peers, self_ip }
    }

    /// Known peers.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Replace the known peers.
    pub fn set_peers(&mut self, peers: Vec<Peer>) {
        self.peers = peers;
    }

    /// Find a peer by name, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<&Peer> {
        self.peers
            .iter()
            .find(|peer| peer.name.eq_ignore_ascii_case(name))
    }

    /// Whether `peer` is this robot.
    pub fn is_self(&self, peer: &Peer) -> bool {
        self.self_ip
            .as_deref()
            .is_some_and(|own| peer.has_address(own))
    }

    /// Resolve the relay target set: the override subset when given, all
    /// known peers otherwise; this robot is dropped unless `include_self`.
    pub fn resolve(&self, overrides: Option<&[String]>, include_self: bool) -> Vec<PeerTarget> {
        let candidates: Vec<PeerTarget> = match overrides {
            Some(names) => names
                .iter()
                .map(|name| match self.lookup(name) {
                    Some(peer) => PeerTarget::Known(peer.clone()),
                    None => PeerTarget::Unresolved(name.clone()),
                })
                .collect(),
            None => self.peers.iter().cloned().map(PeerTarget::Known).collect(),
        };

        candidates
            .into_iter()
            .filter(|target| match target {
                PeerTarget::Known(peer) => include_self || !self.is_self(peer),
                PeerTarget::Unresolved(_) => true,
            })
            .collect()
    }
}

/// What is relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPayload {
    /// A reconstructed `VERB:args` command.
    Command(String),
    /// A named sync signal.
    Sync(String),
    /// An event for the peer's trigger layer.
    Event {
        /// Trigger name
        trigger: String,
        /// Trigger filter
        filter: String,
        /// Free text
        text: String,
    },
}

impl RelayPayload {
    fn to_json(&self, origin: &str) -> Value {
        match self {
            RelayPayload::Command(command) => json!({"command": command, "origin": origin}),
            RelayPayload::Sync(name) => json!({"sync": name, "origin": origin}),
            RelayPayload::Event {
                trigger,
                filter,
                text,
            } => json!({
                "trigger": trigger,
                "filter": filter,
                "text": text,
                "origin": origin,
            }),
        }
    }
}

/// Endpoint layout on peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoints {
    /// This robot's name, sent as `origin`.
    pub origin: String,
    /// Port peers listen on.
    pub port: u16,
    /// Path for relayed commands.
    pub command_path: String,
    /// Path for sync signals.
    pub sync_path: String,
    /// Path for events.
    pub event_path: String,
}

impl RelayEndpoints {
    /// URL for `payload` on a peer reachable at `address`. Addresses that
    /// already carry a scheme are used as the base URL verbatim.
    pub fn url(&self, address: &str, payload: &RelayPayload) -> String {
        let path = match payload {
            RelayPayload::Command(_) => &self.command_path,
            RelayPayload::Sync(_) => &self.sync_path,
            RelayPayload::Event { .. } => &self.event_path,
        };
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{}{}", address.trim_end_matches('/'), path)
        } else {
            format!("http://{}:{}{}", address, self.port, path)
        }
    }
}

/// Outcome of one relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Peers that acknowledged (awaited relays only).
    pub acked: Vec<String>,
    /// Peers whose post failed, with the reason (awaited relays only).
    pub failed: Vec<(String, String)>,
    /// Targets that were not sent to (unresolved names, missing addresses).
    pub skipped: Vec<String>,
    /// Peers posted to without waiting.
    pub detached: Vec<String>,
}

impl FanoutReport {
    /// Whether every awaited post was acknowledged.
    pub fn all_acked(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends relay payloads to peer sets.
#[derive(Clone)]
pub struct Relay {
    transport: Arc<dyn PeerTransport>,
    endpoints: RelayEndpoints,
}

impl Relay {
    /// Create a relay over `transport`.
    pub fn new(transport: Arc<dyn PeerTransport>, endpoints: RelayEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Endpoint layout in use.
    pub fn endpoints(&self) -> &RelayEndpoints {
        &self.endpoints
    }

    /// Relay `payload` to `targets`, awaiting acknowledgements when
    /// `await_ack`, otherwise spawning detached posts.
    pub async fn send(
        &self,
        targets: Vec<PeerTarget>,
        payload: &RelayPayload,
        await_ack: bool,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        let body = payload.to_json(&self.endpoints.origin);
        let mut posts = Vec::new();

        for target in targets {
            let peer = match target {
                PeerTarget::Known(peer) => peer,
                PeerTarget::Unresolved(name) => {
                    warn!(peer = %name, "fan-out override names an unknown peer");
                    report.skipped.push(name);
                    continue;
                }
            };
            let Some(address) = peer.primary_address() else {
                warn!(peer = %peer.name, "peer has no address; skipping relay");
                report.skipped.push(peer.name);
                continue;
            };
            posts.push((peer.name.clone(), self.endpoints.url(address, payload)));
        }

        if !await_ack {
            for (name, url) in posts {
                let transport = self.transport.clone();
                let body = body.clone();
                debug!(peer = %name, %url, "relaying without ack");
                tokio::spawn(async move {
                    if let Err(err) = transport.post_json(&url, body).await {
                        debug!(%url, error = %err, "detached relay failed");
                    }
                });
                report.detached.push(name);
            }
            return report;
        }

        let results = join_all(posts.into_iter().map(|(name, url)| {
            let transport = self.transport.clone();
            let body = body.clone();
            async move {
                let result = transport.post_json(&url, body).await;
                (name, result)
            }
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(_) => report.acked.push(name),
                Err(err) => {
                    warn!(peer = %name, error = %err, "relay was not acknowledged");
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        report
    }
}
