/*!
 * Error types for Tidemark
 */

use std::fmt;
use std::io;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ALREADY_RUNNING: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum MirrorError {
    /// Another instance holds the running flag (or a prior run crashed)
    AlreadyRunning,

    /// Configuration error
    Config(String),

    /// Instance-state file could not be read or written
    State(String),

    /// I/O error
    Io(io::Error),

    /// Store transport failure outside any single series (journal setup, client build)
    Store(StoreError),
}

impl MirrorError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MirrorError::AlreadyRunning => EXIT_ALREADY_RUNNING,
            _ => EXIT_FATAL,
        }
    }

    /// Check if this error is fatal (terminates the process)
    ///
    /// Per-series sync failures never reach this type; they are isolated
    /// inside the mirror loop as `SyncError`. Everything that does reach
    /// here is fatal by construction.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorError::AlreadyRunning => {
                write!(
                    f,
                    "another instance is already running on this device, or a previous \
                     run exited uncleanly"
                )
            }
            MirrorError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            MirrorError::State(msg) => {
                write!(f, "Instance-state error: {}", msg)
            }
            MirrorError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            MirrorError::Store(err) => {
                write!(f, "Store error: {}", err)
            }
        }
    }
}

impl std::error::Error for MirrorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MirrorError::Io(err) => Some(err),
            MirrorError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MirrorError {
    fn from(err: io::Error) -> Self {
        MirrorError::Io(err)
    }
}

impl From<StoreError> for MirrorError {
    fn from(err: StoreError) -> Self {
        MirrorError::Store(err)
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(err: toml::de::Error) -> Self {
        MirrorError::Config(format!("TOML parse error: {}", err))
    }
}
