use serde::{Deserialize, Serialize};

/// Fan-out mode decoded from the `$`, `$$`, `$%` and `$$%` verb sigils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fanout {
    /// No sigil: the clause only runs locally.
    #[default]
    None,
    /// `$`: relay to the other peers without waiting.
    ToOthersOnly,
    /// `$$`: relay to the other peers and wait for their acknowledgements.
    ToOthersAndAwaitAck,
    /// `$%`: run locally and relay without waiting.
    ToAllIncludingSelf,
    /// `$$%`: run locally, relay and wait for acknowledgements.
    ToAllAndAwaitAck,
}

impl Fanout {
    /// Decode the sigil carried by a verb segment; first match wins in the
    /// order `$$%`, `$%`, `$$`, `$`.
    pub fn from_verb_segment(segment: &str) -> Self {
        if segment.contains("$$%") {
            Fanout::ToAllAndAwaitAck
        } else if segment.contains("$%") {
            Fanout::ToAllIncludingSelf
        } else if segment.contains("$$") {
            Fanout::ToOthersAndAwaitAck
        } else if segment.contains('$') {
            Fanout::ToOthersOnly
        } else {
            Fanout::None
        }
    }

    /// Whether the local capability call is performed.
    pub fn include_self(self) -> bool {
        matches!(
            self,
            Fanout::None | Fanout::ToAllIncludingSelf | Fanout::ToAllAndAwaitAck
        )
    }

    /// Whether relays wait for peer acknowledgements.
    pub fn await_ack(self) -> bool {
        matches!(self, Fanout::ToOthersAndAwaitAck | Fanout::ToAllAndAwaitAck)
    }

    /// Whether any relay happens for ordinary verbs.
    pub fn relays(self) -> bool {
        self != Fanout::None
    }
}

/// One-shot markers attached to a clause.
///
/// Both may be set on the same clause; such a clause fires at startup and again
/// on explicit stop, never in the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClauseMarkers {
    /// `*`: run once before the main loop.
    pub startup: bool,
    /// `#`: run once when the script is explicitly stopped.
    pub completion: bool,
}

impl ClauseMarkers {
    /// Whether the clause takes part in the repeated main loop.
    pub fn in_main_loop(self) -> bool {
        !self.startup && !self.completion
    }
}

/// A single `;`-delimited command clause after modifier decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Clause text after `#`/`*` stripping; identity for the one-shot sets.
    pub text: String,
    /// One-shot markers.
    pub markers: ClauseMarkers,
    /// Cleaned, upper-cased verb (sigils, `{N}` and `[...]` removed).
    pub verb: String,
    /// Everything after the first `:`, untouched.
    pub raw_args: String,
    /// `{N}` cap on the loop passes this clause fires in.
    pub loop_limit: Option<u32>,
    /// `[a,b]` peer override list.
    pub peer_override: Option<Vec<String>>,
    /// Fan-out mode.
    pub fanout: Fanout,
}

impl Clause {
    /// Whether the clause dispatches on loop pass `loop_index` (1-based).
    ///
    /// The first pass always dispatches; afterwards the clause fires while
    /// `loop_index <= limit`.
    pub fn fires_on_pass(&self, loop_index: u32) -> bool {
        match self.loop_limit {
            Some(limit) if loop_index > 1 => limit >= loop_index,
            _ => true,
        }
    }

    /// Command string relayed to peers: the cleaned verb plus original args,
    /// so the receiving peer does not fan out again.
    pub fn relay_command(&self) -> String {
        if self.raw_args.is_empty() {
            self.verb.clone()
        } else {
            format!("{}:{}", self.verb, self.raw_args)
        }
    }

    /// Peer override that applies on `loop_index`; only honored after the
    /// first pass.
    pub fn active_override(&self, loop_index: u32) -> Option<&[String]> {
        if loop_index > 1 {
            self.peer_override.as_deref()
        } else {
            None
        }
    }
}
