//! Interpreter for the animation-script mini-language.
//!
//! Scripts are `;`-delimited clauses of the form `VERB:arg1,arg2`, optionally
//! decorated with one-shot markers (`*`, `#`), fan-out sigils (`$`, `$$`, `$%`,
//! `$$%`), a loop limit (`{N}`) and a peer override (`[a,b]`). This module
//! provides the clause model, the parser, the verb dispatcher and the runner
//! that sequences a script against a [`Performer`](crate::runtime::Performer).

/// Argument shapes and typed accessors.
pub mod args;
/// Clause model and modifier decoding.
pub mod ast;
/// Parser for the delimited script grammar.
pub mod parser;
/// Script runner / loop controller.
pub mod runtime;
/// Verb table and handlers.
pub mod verbs;

pub use args::{ArgShape, Args};
pub use ast::{Clause, ClauseMarkers, Fanout};
pub use parser::{DelimitedGrammar, ParsedScript, ScriptGrammar, SkippedClause, parse_script};
pub use runtime::ScriptRunner;
pub use verbs::{Dispatcher, VerbContext, VerbHandler};

use thiserror::Error;

/// Convenience result alias for parse operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Parse-level defects; the offending clause is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Clause has no verb before the first `:`.
    #[error("clause '{0}' has no verb")]
    MissingVerb(String),

    /// A `{` or `[` modifier is never closed.
    #[error("clause '{clause}' has an unterminated '{open}' modifier")]
    UnterminatedModifier {
        /// Offending clause
        clause: String,
        /// Opening character
        open: char,
    },

    /// `{N}` does not hold a non-negative integer.
    #[error("clause '{clause}' has an invalid loop limit '{value}'")]
    InvalidLoopLimit {
        /// Offending clause
        clause: String,
        /// Text between the braces
        value: String,
    },
}
