//! Choreo – animation-script execution engine for expressive robot characters
//!
//! This crate interprets the semicolon-delimited animation scripts authored in
//! conversation data and drives a character through them:
//! - A forgiving tokenizer for `VERB:args;` clauses with one-shot, loop-limit,
//!   peer-override and fan-out modifiers
//! - A verb table dispatching onto movement, display, audio, locomotion,
//!   hardware and skill capabilities
//! - A run/repeat/cancel loop controller with startup and completion clauses
//! - A single-slot sync rendezvous (`AWAIT-SYNC`/`AWAIT-ANY`) with timeouts
//! - HTTP fan-out of commands, sync signals and events to peer robots
//! - A trigger aggregator and a head-follow control loop

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Collaborator seams (movement, display, audio, peers, ...).
pub mod capability;
/// Script language and the loop controller that executes it.
pub mod interpreter;
/// Shared per-character state, synchronization, fan-out and configuration.
pub mod runtime;

// Re-export key types for convenience
pub use capability::Capabilities;
pub use interpreter::{Clause, ScriptRunner, parse_script};
pub use runtime::{EngineConfig, Performer, TriggerBoard};

/// Current version of the Choreo engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
