//! Error types for crosstalk-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::AgentVariant;

/// Main error type for the crosstalk-core library
#[derive(Error, Debug)]
pub enum Error {
    /// The tmux server is not reachable
    #[error("tmux server is not running")]
    MultiplexerDown,

    /// Receiver name missing from every registry
    #[error("agent '{0}' not found in any registry")]
    NameUnknown(String),

    /// The name resolved but no live pane matches its slot
    #[error("{name} ({variant}) not found in {}", .directory.display())]
    PaneNotFound {
        name: String,
        variant: AgentVariant,
        directory: PathBuf,
    },

    /// A type-keys operation failed because the pane went away
    #[error("pane {0} vanished during delivery")]
    PaneVanished(String),

    /// SSH transport to a remote host failed
    #[error("host '{host}' unreachable: {detail}")]
    RemoteUnreachable { host: String, detail: String },

    /// A subprocess or remote operation exceeded its deadline
    #[error("{what} timed out after {:.1}s", .after.as_secs_f64())]
    Timeout { what: String, after: Duration },

    /// A subprocess exited unsuccessfully
    #[error("{program} failed: {detail}")]
    CommandFailed { program: String, detail: String },

    /// The history database cannot be opened; sends proceed without logging
    #[error("history store unavailable: {0}")]
    StoreUnavailable(String),

    /// A registry file exists but does not parse
    #[error("registry file is corrupt: {0}")]
    RegistryCorrupt(String),

    /// Registration rejected: the name is bound to a different slot
    #[error("name '{name}' is already registered to {variant} @ {}", .directory.display())]
    DuplicateName {
        name: String,
        variant: AgentVariant,
        directory: PathBuf,
    },

    /// Registration rejected: the slot already carries a different name
    #[error("{variant} @ {} on {host} is already registered as '{name}'", .directory.display())]
    SlotOccupied {
        name: String,
        variant: AgentVariant,
        directory: PathBuf,
        host: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for crosstalk-core
pub type Result<T> = std::result::Result<T, Error>;
