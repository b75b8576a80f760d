//! Remote probe and remote delivery
//!
//! Both ride the stored connect invocation: `argv[0] argv[1..] <remote
//! command>`, with `-i <key>` spliced in after `argv[0]` when the host has
//! a credential path. The remote side is authoritative for its own panes,
//! so probing reads the remote registry document and delivery delegates to
//! the remote host's own `send` tool.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tmux::CommandRunner;
use crate::types::{Activity, PaneFacts, PaneRef, RegisteredAgent, RemoteHost};

/// Deadline for fetching a remote registry.
pub const REMOTE_PROBE_DEADLINE: Duration = Duration::from_secs(5);
/// Deadline for a delegated remote send.
pub const REMOTE_SEND_DEADLINE: Duration = Duration::from_secs(10);

/// Build the ssh argv for a host: connect tokens with the key flag
/// spliced in after the program name.
pub fn ssh_argv(host: &RemoteHost) -> Result<Vec<String>> {
    let mut argv: Vec<String> = host
        .connect_command
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if argv.is_empty() {
        return Err(Error::RemoteUnreachable {
            host: host.name.clone(),
            detail: "empty connect command".to_string(),
        });
    }

    if !host.ssh_key.is_empty() {
        let key = expand_tilde(&host.ssh_key);
        argv.splice(1..1, ["-i".to_string(), key.display().to_string()]);
    }

    Ok(argv)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from).or_else(dirs::home_dir) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Quote `text` for a remote shell, preserving embedded whitespace and
/// quotation marks.
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn run_over_ssh(
    runner: &dyn CommandRunner,
    host: &RemoteHost,
    remote_command: String,
    deadline: Duration,
) -> Result<String> {
    let mut argv = ssh_argv(host)?;
    argv.push(remote_command);

    let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
    runner.run(&argv[0], &args, deadline).map_err(|e| match e {
        Error::Timeout { .. } => e,
        other => Error::RemoteUnreachable {
            host: host.name.clone(),
            detail: other.to_string(),
        },
    })
}

/// Fetch the registered agents of a remote host.
pub fn fetch_registry(runner: &dyn CommandRunner, host: &RemoteHost) -> Result<Vec<RegisteredAgent>> {
    let remote_command = format!(
        "cat {} 2>/dev/null || echo '[]'",
        Config::remote_registry_path()
    );
    let output = run_over_ssh(runner, host, remote_command, REMOTE_PROBE_DEADLINE)?;

    serde_json::from_str(output.trim()).map_err(|e| Error::RemoteUnreachable {
        host: host.name.clone(),
        detail: format!("registry did not parse: {e}"),
    })
}

/// Probe a remote host.
///
/// Yields one synthetic pane snapshot per remote registration: the remote
/// pane's actual tmux address is not known here and is not needed, since
/// delivery delegates to the remote's own tool and the registered name
/// doubles as the address. Registered agents are assumed active.
pub fn probe_remote(runner: &dyn CommandRunner, host: &RemoteHost) -> Result<Vec<PaneFacts>> {
    let agents = fetch_registry(runner, host)?;

    Ok(agents
        .into_iter()
        .filter(|a| a.variant.is_routable())
        .map(|a| PaneFacts {
            pane: PaneRef {
                host: host.name.clone(),
                pane_address: a.name.clone(),
                display_label: a.name.clone(),
            },
            directory: a.directory,
            command: a.variant.as_str().to_string(),
            variant: a.variant,
            activity: Activity::Active,
        })
        .collect())
}

/// Deliver a message by invoking the remote host's own `send` tool.
///
/// The `--from` pair is omitted for unknown senders, matching the local
/// envelope suppression.
pub fn send_remote(
    runner: &dyn CommandRunner,
    host: &RemoteHost,
    sender: Option<&str>,
    receiver: &str,
    body: &str,
) -> Result<()> {
    let remote_command = match sender {
        Some(sender) => format!(
            "send --from {} {} {}",
            sender,
            receiver,
            shell_quote(body)
        ),
        None => format!("send {} {}", receiver, shell_quote(body)),
    };

    tracing::info!(host = %host.name, receiver, "delegating delivery to remote send");
    run_over_ssh(runner, host, remote_command, REMOTE_SEND_DEADLINE).map(|_| ())
}
