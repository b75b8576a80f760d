//! Multiplexer probe
//!
//! Enumerates tmux panes on the local host and resolves which agent runs
//! in each one. All subprocess access goes through [`CommandRunner`] so the
//! probe, router, and sender can be exercised against a scripted fake.
//!
//! Panes whose command is a generic interpreter (a `node` binary hosting
//! an agent CLI, for instance) are re-resolved by walking the pane's child
//! processes: tmux reports only the interpreter name, the children carry
//! the real command line.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::classify::{classify, is_generic_interpreter};
use crate::error::{Error, Result};
use crate::types::{Activity, AgentVariant, PaneFacts, PaneRef, LOCAL_HOST};

/// Deadline for the pane listing call.
pub const PANE_LIST_DEADLINE: Duration = Duration::from_secs(2);
/// Deadline for each step of the child-process walk.
pub const PID_WALK_DEADLINE: Duration = Duration::from_secs(1);

/// One field per colon; the path field may itself contain colons, so the
/// parser pins fields from both ends and rejoins the middle.
const LIST_FORMAT: &str = "#{session_name}:#{session_id}:#{window_index}.#{pane_index}:#{pane_current_path}:#{pane_current_command}:#{?pane_active,active,idle}";

// ============================================
// Command execution
// ============================================

/// Seam for every external command the core runs (tmux, pgrep, ps, ssh).
///
/// `run` returns the command's stdout on success. Implementations must
/// enforce the deadline; a call past it returns [`Error::Timeout`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], deadline: Duration) -> Result<String>;
}

/// [`CommandRunner`] that spawns real processes.
///
/// The child is waited on from a helper thread; if the deadline passes
/// first, the child is killed and the call reports a timeout.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], deadline: Duration) -> Result<String> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child.id();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(child.wait_with_output());
        });

        let output = match rx.recv_timeout(deadline) {
            Ok(result) => result?,
            Err(_) => {
                let _ = Command::new("kill").arg(pid.to_string()).status();
                return Err(Error::Timeout {
                    what: program.to_string(),
                    after: deadline,
                });
            }
        };

        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::CommandFailed {
                program: program.to_string(),
                detail,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ============================================
// Probe
// ============================================

/// Check whether a tmux server is reachable.
pub fn server_running(runner: &dyn CommandRunner) -> bool {
    runner
        .run("tmux", &["has-session"], PANE_LIST_DEADLINE)
        .is_ok()
}

/// Snapshot every agent pane on the local host.
///
/// Returns [`Error::MultiplexerDown`] only when the tmux server is not
/// reachable; an empty pane list is an empty `Vec`, not an error. Panes
/// that stay [`AgentVariant::Unknown`] after the child walk are dropped:
/// they are not addressable.
pub fn probe(runner: &dyn CommandRunner) -> Result<Vec<PaneFacts>> {
    if !server_running(runner) {
        return Err(Error::MultiplexerDown);
    }

    let output = runner
        .run("tmux", &["list-panes", "-a", "-F", LIST_FORMAT], PANE_LIST_DEADLINE)
        .map_err(|e| match e {
            Error::Timeout { .. } => e,
            _ => Error::MultiplexerDown,
        })?;

    let mut panes = Vec::new();
    for line in output.lines() {
        let Some(raw) = parse_pane_line(line) else {
            continue;
        };

        let mut variant = classify(&raw.command);
        if variant == AgentVariant::Unknown && is_generic_interpreter(&raw.command) {
            variant = resolve_pane_children(runner, &raw.pane_address);
        }
        if variant == AgentVariant::Unknown {
            continue;
        }

        panes.push(PaneFacts {
            pane: PaneRef {
                host: LOCAL_HOST.to_string(),
                display_label: raw.pane_address.clone(),
                pane_address: raw.pane_address,
            },
            directory: raw.directory,
            command: raw.command,
            variant,
            activity: raw.activity,
        });
    }

    tracing::debug!(panes = panes.len(), "local probe complete");
    Ok(panes)
}

struct RawPane {
    pane_address: String,
    directory: PathBuf,
    command: String,
    activity: Activity,
}

/// Parse one `list-panes` line. Malformed lines yield `None`.
///
/// Fields are `session:$id:window.pane:path:command:activity`. Session
/// names and pane commands cannot contain colons, but paths can, so the
/// three leading and two trailing fields are split off and the middle is
/// rejoined as the path.
fn parse_pane_line(line: &str) -> Option<RawPane> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() < 6 {
        return None;
    }

    let session = parts[0];
    // parts[1] is the session id ($23); targeting uses the name
    let window_pane = parts[2];
    let directory = parts[3..parts.len() - 2].join(":");
    let command = parts[parts.len() - 2];
    let activity = match parts[parts.len() - 1] {
        "active" => Activity::Active,
        "idle" => Activity::Idle,
        _ => Activity::Error,
    };

    if session.is_empty() || window_pane.is_empty() || directory.is_empty() {
        return None;
    }

    Some(RawPane {
        pane_address: format!("{session}:{window_pane}"),
        directory: PathBuf::from(directory),
        command: command.to_string(),
        activity,
    })
}

/// Resolve the agent behind a generic-interpreter pane.
///
/// Reads the pane's root PID, enumerates its direct children, and
/// classifies each child's full command line; the first non-unknown match
/// wins. A child that disappears mid-walk is skipped.
fn resolve_pane_children(runner: &dyn CommandRunner, pane_address: &str) -> AgentVariant {
    let pid = match runner.run(
        "tmux",
        &["display-message", "-p", "-t", pane_address, "#{pane_pid}"],
        PID_WALK_DEADLINE,
    ) {
        Ok(out) => out.trim().to_string(),
        Err(_) => return AgentVariant::Unknown,
    };
    if pid.is_empty() {
        return AgentVariant::Unknown;
    }

    // pgrep exits non-zero when the shell has no children; that just means
    // there is nothing to classify
    let children = match runner.run("pgrep", &["-P", &pid], PID_WALK_DEADLINE) {
        Ok(out) => out,
        Err(_) => return AgentVariant::Unknown,
    };

    for child in children.lines().map(str::trim).filter(|c| !c.is_empty()) {
        let command = match runner.run("ps", &["-p", child, "-o", "command="], PID_WALK_DEADLINE) {
            Ok(out) => out,
            Err(_) => continue,
        };
        let variant = classify(&command);
        if variant != AgentVariant::Unknown {
            return variant;
        }
    }

    AgentVariant::Unknown
}

// ============================================
// Type-keys primitives
// ============================================

/// Type literal text into a pane. A failure means the pane is gone.
pub fn type_keys(runner: &dyn CommandRunner, pane_address: &str, text: &str) -> Result<()> {
    runner
        .run("tmux", &["send-keys", "-t", pane_address, text], PANE_LIST_DEADLINE)
        .map(|_| ())
        .map_err(|e| match e {
            Error::Timeout { .. } => e,
            _ => Error::PaneVanished(pane_address.to_string()),
        })
}

/// Send a carriage return to a pane.
pub fn submit_key(runner: &dyn CommandRunner, pane_address: &str) -> Result<()> {
    runner
        .run("tmux", &["send-keys", "-t", pane_address, "C-m"], PANE_LIST_DEADLINE)
        .map(|_| ())
        .map_err(|e| match e {
            Error::Timeout { .. } => e,
            _ => Error::PaneVanished(pane_address.to_string()),
        })
}
