//! Verb table.
//!
//! Each verb maps to a [`VerbHandler`] that declares its argument shape and
//! performs the local capability call. The [`Dispatcher`] validates arity,
//! runs the local call when the clause includes this robot, and relays to
//! peers as the clause's fan-out sigil demands.

use super::args::{ArgShape, Args};
use super::ast::Clause;
use crate::runtime::context::{AnimationContext, InteractionContext};
use crate::runtime::error::{CapabilityResult, DispatchError, DispatchResult};
use crate::runtime::fanout::{FanoutReport, RelayPayload};
use crate::runtime::performer::Performer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod audio;
mod control;
mod display;
mod follow;
mod hardware;
mod locomotion;
mod movement;
mod skills;

pub use display::ContentKind;

/// Verb that only relays a named sync signal.
pub const SYNC_VERB: &str = "SYNC";
/// Verb that only relays an event payload.
pub const EVENT_VERB: &str = "EVENT";

const SYNC_SHAPE: ArgShape = ArgShape::exact(1);
const EVENT_SHAPE: ArgShape = ArgShape::text_after(2);

/// Everything a handler may touch while executing one clause.
pub struct VerbContext<'a> {
    /// Character state and capabilities.
    pub performer: &'a Performer,
    /// Animation being performed; SPEAK-class verbs write to it.
    pub animation: &'a mut AnimationContext,
    /// Interaction the animation belongs to.
    pub interaction: &'a mut InteractionContext,
    /// Current loop pass (0 for one-shot clauses).
    pub loop_index: u32,
    /// Cancellation of the current run.
    pub cancel: &'a CancellationToken,
}

/// Local behavior of one verb.
#[async_trait]
pub trait VerbHandler: Send + Sync {
    /// Accepted argument shape, checked before `invoke`.
    fn shape(&self) -> ArgShape;

    /// Perform the verb on this robot.
    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()>;
}

/// Lifts capability failures into dispatch errors naming the verb.
pub(crate) trait ForVerb<T> {
    fn for_verb(self, args: &Args) -> DispatchResult<T>;
}

impl<T> ForVerb<T> for CapabilityResult<T> {
    fn for_verb(self, args: &Args) -> DispatchResult<T> {
        self.map_err(|source| DispatchError::Capability {
            verb: args.verb().to_string(),
            source,
        })
    }
}

/// Maps upper-case verbs to handlers.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn VerbHandler>>,
}

impl Dispatcher {
    /// A dispatcher with no verbs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The full verb table.
    pub fn standard() -> Self {
        let mut dispatcher = Self::empty();
        movement::register(&mut dispatcher);
        locomotion::register(&mut dispatcher);
        display::register(&mut dispatcher);
        audio::register(&mut dispatcher);
        hardware::register(&mut dispatcher);
        skills::register(&mut dispatcher);
        follow::register(&mut dispatcher);
        control::register(&mut dispatcher);
        dispatcher
    }

    /// Register (or replace) the handler for `verb`.
    pub fn register(&mut self, verb: &str, handler: impl VerbHandler + 'static) {
        self.handlers
            .insert(verb.trim().to_ascii_uppercase(), Arc::new(handler));
    }

    /// Whether `verb` is known, including the relay-only verbs.
    pub fn knows(&self, verb: &str) -> bool {
        let verb = verb.to_ascii_uppercase();
        is_relay_only(&verb) || self.handlers.contains_key(&verb)
    }

    /// Known verbs, sorted.
    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self.handlers.keys().cloned().collect();
        verbs.push(SYNC_VERB.to_string());
        verbs.push(EVENT_VERB.to_string());
        verbs.sort();
        verbs.dedup();
        verbs
    }

    /// Dispatch one clause: local call when the clause includes this robot,
    /// then the relay its fan-out sigil asks for. Returns the relay report
    /// when a relay happened.
    pub async fn dispatch(
        &self,
        clause: &Clause,
        cx: &mut VerbContext<'_>,
    ) -> DispatchResult<Option<FanoutReport>> {
        let verb = clause.verb.to_ascii_uppercase();
        if is_relay_only(&verb) {
            return self.relay_only(&verb, clause, cx).await.map(Some);
        }

        let handler = self
            .handlers
            .get(&verb)
            .ok_or_else(|| DispatchError::UnknownVerb(verb.clone()))?;
        let args = Args::parse(&verb, &clause.raw_args, handler.shape())?;

        let local = if clause.fanout.include_self() {
            debug!(verb = %verb, loop_index = cx.loop_index, "dispatching locally");
            handler.invoke(cx, &args).await
        } else {
            Ok(())
        };

        let report = if clause.fanout.relays() {
            let targets = cx
                .performer
                .resolve_peers(clause.active_override(cx.loop_index), false);
            let payload = RelayPayload::Command(clause.relay_command());
            Some(
                cx.performer
                    .relay()
                    .send(targets, &payload, clause.fanout.await_ack())
                    .await,
            )
        } else {
            None
        };

        local.map(|()| report)
    }

    async fn relay_only(
        &self,
        verb: &str,
        clause: &Clause,
        cx: &VerbContext<'_>,
    ) -> DispatchResult<FanoutReport> {
        let payload = if verb == SYNC_VERB {
            let args = Args::parse(verb, &clause.raw_args, SYNC_SHAPE)?;
            RelayPayload::Sync(args.unquoted(0).unwrap_or_default().to_string())
        } else {
            let args = Args::parse(verb, &clause.raw_args, EVENT_SHAPE)?;
            RelayPayload::Event {
                trigger: args.unquoted(0).unwrap_or_default().to_string(),
                filter: args.unquoted(1).unwrap_or_default().to_string(),
                text: args.str(2).unwrap_or_default().to_string(),
            }
        };

        // These verbs never act locally; an include-self sigil keeps this
        // robot in the peer set so the relay loops back.
        let loopback = clause.fanout.relays() && clause.fanout.include_self();
        let targets = cx
            .performer
            .resolve_peers(clause.active_override(cx.loop_index), loopback);
        debug!(verb, peers = targets.len(), "relaying");
        Ok(cx
            .performer
            .relay()
            .send(targets, &payload, clause.fanout.await_ack())
            .await)
    }
}

fn is_relay_only(verb: &str) -> bool {
    verb == SYNC_VERB || verb == EVENT_VERB
}
