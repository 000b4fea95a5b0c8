//! Error types for the Choreo engine
//!
//! Domain errors use thiserror; the loop controller decides which of them are
//! fatal (only under `stop_on_failed_command`) and logs the rest.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Dispatch-related errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Peer transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Failure reported by a collaborator capability (movement, display, audio, ...).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The collaborator refused the request.
    #[error("{capability} rejected the request: {detail}")]
    Rejected {
        /// Capability name (e.g. `audio.speak`)
        capability: &'static str,
        /// Reason supplied by the collaborator
        detail: String,
    },

    /// The collaborator is not available on this character.
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// The collaborator failed while executing the request.
    #[error("{capability} failed: {detail}")]
    Failed {
        /// Capability name
        capability: &'static str,
        /// Failure details
        detail: String,
    },
}

/// Convenience result alias for capability calls
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Peer transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request could not be sent or timed out
    #[error("request to {url} failed: {detail}")]
    Request {
        /// Target URL
        url: String,
        /// Error details
        detail: String,
    },

    /// Peer answered with a non-success status
    #[error("peer at {url} answered {status}")]
    Status {
        /// Target URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}

/// Convenience result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors raised while dispatching a single clause
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Verb is not in the command table
    #[error("unknown verb '{0}'")]
    UnknownVerb(String),

    /// Argument count outside the verb's declared shape
    #[error("{verb} expects {expected} arguments, received {received}")]
    Arity {
        /// Verb being dispatched
        verb: String,
        /// Human-readable expected shape
        expected: String,
        /// Number of arguments supplied
        received: usize,
    },

    /// Argument could not be converted to the expected type
    #[error("{verb} argument {index} ('{value}') is not a valid {expected}")]
    InvalidArgument {
        /// Verb being dispatched
        verb: String,
        /// Zero-based argument position
        index: usize,
        /// Raw argument text
        value: String,
        /// Expected type name
        expected: &'static str,
    },

    /// Underlying capability failed
    #[error("{verb}: {source}")]
    Capability {
        /// Verb being dispatched
        verb: String,
        /// Capability failure
        #[source]
        source: CapabilityError,
    },

    /// Dispatch was interrupted by cancellation
    #[error("{0} interrupted by cancellation")]
    Canceled(String),
}

/// Convenience result alias for dispatch operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Atomic write failed
    #[error("Atomic write failed for {path}: {detail}")]
    AtomicWriteFailed {
        /// Path where write failed
        path: PathBuf,
        /// Error details
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_messages_name_the_verb() {
        let err = DispatchError::Arity {
            verb: "HEAD".into(),
            expected: "4".into(),
            received: 2,
        };
        assert_eq!(err.to_string(), "HEAD expects 4 arguments, received 2");

        let err = DispatchError::Capability {
            verb: "SPEAK".into(),
            source: CapabilityError::Unavailable("audio.speak"),
        };
        assert_eq!(err.to_string(), "SPEAK: audio.speak is not available");
    }

    #[test]
    fn storage_errors_lift_into_engine_errors() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let engine: EngineError = StorageError::from(io).into();
        assert!(matches!(engine, EngineError::Storage(StorageError::Io(_))));
    }
}
