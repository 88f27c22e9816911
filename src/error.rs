//! Error taxonomy: argument, I/O, and malformed-input failures are typed and
//! fail fast; model invariant violations are assertions, not errors.

use std::io;
use thiserror::Error;

/// Errors surfaced by the simulator library.
#[derive(Debug, Error)]
pub enum SimError {
    /// Bad command-line or configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying file could not be read or written.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Workload file does not follow the expected text format.
    #[error("malformed workload file: {0}")]
    MalformedWorkload(String),

    /// Architecture file does not follow the expected text format.
    #[error("malformed architecture file: {0}")]
    MalformedArch(String),
}

impl SimError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
