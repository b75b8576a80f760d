//! Core domain types for crosstalk
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Agent** | An interactive AI coding CLI (claude, opencode, coder, crush) running in a pane |
//! | **Variant** | The specific agent product |
//! | **Pane** | One addressable input/output region inside a tmux session |
//! | **Host** | A machine; the local machine carries the nickname `"host"` |
//! | **Registration** | A human-assigned name bound to a (variant, directory, host) slot |
//! | **Envelope** | The wrapper text carrying sender identity and the reply hint |

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Nickname of the local machine in registries and pane snapshots.
pub const LOCAL_HOST: &str = "host";

// ============================================
// Agent variants
// ============================================

/// Recognized AI coding agents.
///
/// The set is closed: extending it means touching the classifier and this
/// enum together. `Unknown` panes are never addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentVariant {
    Claude,
    Opencode,
    Coder,
    Crush,
    Unknown,
}

impl AgentVariant {
    /// Identifier used in registry files and display tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentVariant::Claude => "claude",
            AgentVariant::Opencode => "opencode",
            AgentVariant::Coder => "coder",
            AgentVariant::Crush => "crush",
            AgentVariant::Unknown => "unknown",
        }
    }

    /// True for every variant a message can be routed to.
    pub fn is_routable(&self) -> bool {
        !matches!(self, AgentVariant::Unknown)
    }
}

impl fmt::Display for AgentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Pane snapshots
// ============================================

/// Whether a pane currently has tmux focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Active,
    Idle,
    Error,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Active => "active",
            Activity::Idle => "idle",
            Activity::Error => "error",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a pane on one host.
///
/// `pane_address` has the shape `<session>:<window>.<pane>` and is what
/// tmux type-keys operations target. Panes are ephemeral; a `PaneRef` is
/// only valid while the pane exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneRef {
    /// Host nickname; [`LOCAL_HOST`] for the local machine.
    pub host: String,
    /// tmux targeting string, or the registered name for remote panes.
    pub pane_address: String,
    /// Human-friendly rendering of the address.
    pub display_label: String,
}

/// Snapshot of one pane at a probe instant.
#[derive(Debug, Clone)]
pub struct PaneFacts {
    pub pane: PaneRef,
    /// Absolute working directory of the pane's process.
    pub directory: PathBuf,
    /// Command reported by tmux (post child-walk refinement it may differ
    /// from the resolved variant's binary name).
    pub command: String,
    pub variant: AgentVariant,
    pub activity: Activity,
}

// ============================================
// Registrations
// ============================================

fn default_host() -> String {
    LOCAL_HOST.to_string()
}

/// A human-named binding of an agent pane.
///
/// `name` is the routing key and unique across the registry; the slot
/// `(variant, directory, host)` is unique as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    /// User-given name.
    pub name: String,
    /// Agent product in this slot.
    #[serde(rename = "agent_type")]
    pub variant: AgentVariant,
    /// Full working directory path.
    pub directory: PathBuf,
    /// Host nickname; absent in pre-multihost registry files.
    #[serde(rename = "machine", default = "default_host")]
    pub host: String,
}

impl RegisteredAgent {
    pub fn is_local(&self) -> bool {
        self.host == LOCAL_HOST
    }

    /// Slot identity used for uniqueness and reconciliation.
    pub fn slot(&self) -> (AgentVariant, &std::path::Path, &str) {
        (self.variant, self.directory.as_path(), self.host.as_str())
    }
}

// ============================================
// Remote hosts
// ============================================

/// How to reach one remote machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    /// User-given nickname; never `"host"`.
    pub name: String,
    /// Path to a private key file; empty when the default identity is used.
    #[serde(default)]
    pub ssh_key: String,
    /// Tokens that open an interactive shell, e.g. `ssh user@lab`.
    pub connect_command: String,
}
