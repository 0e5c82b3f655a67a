//! Error types for the replwire adapter
//!
//! Domain failures are `thiserror` enums; the command dispatcher converts
//! [`HandlerError`] into failed responses so no handler failure ever aborts
//! the message loop.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::script::ScriptError;

/// Transport and framing failures. All of them end the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the transport
    #[error("transport closed")]
    Closed,

    /// A frame was not valid JSON
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// IO error on the transport
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reference cache misses. These are local, recoverable conditions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Handle was never issued, or its generation has been cleared
    #[error("Invalid variable reference: {0}")]
    UnknownHandle(i64),

    /// Handle is a sentinel and names no concrete value
    #[error("Variable reference {0} does not name a value")]
    Sentinel(i64),
}

/// Evaluation context failures outside of evaluated code itself.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Launch arguments named no input
    #[error("Unsupported script type")]
    UnsupportedLaunch,

    /// Module could not be entered
    #[error("Cannot switch to {0}")]
    UnknownModule(String),

    /// `extraArguments` could not be split
    #[error("invalid extra arguments: {0}")]
    Arguments(#[from] shell_words::ParseError),

    /// Script file could not be read
    #[error("cannot read {path}: {source}")]
    ReadScript {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// External process could not be started or awaited
    #[error("cannot run {path}: {source}")]
    Process {
        /// Program path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Failure inside evaluated code
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Anything a command handler may fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Evaluated code failed
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Context operation failed
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Cache lookup failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Request arguments were missing or malformed
    #[error("missing or invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Command is part of the surface but served elsewhere
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// Command cannot run in the current session state
    #[error("request not allowed while awaiting input")]
    AwaitingInput,

    /// Transport failed while the handler was pumping messages
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Handler panicked
    #[error("internal error: {0}")]
    Panic(String),
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config IO error at {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// File contents were not a valid configuration
    #[error("invalid config at {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

impl HandlerError {
    /// Script error carried by this failure, if any.
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            HandlerError::Script(err) | HandlerError::Context(ContextError::Script(err)) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ErrorKind;

    #[test]
    fn launch_without_input_message() {
        assert_eq!(ContextError::UnsupportedLaunch.to_string(), "Unsupported script type");
    }

    #[test]
    fn handler_error_exposes_nested_script_error() {
        let err = HandlerError::from(ContextError::from(ScriptError::new(ErrorKind::NameError, "x")));
        assert_eq!(err.script_error().map(|e| e.kind), Some(ErrorKind::NameError));
        assert!(HandlerError::AwaitingInput.script_error().is_none());
    }
}
