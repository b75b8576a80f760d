//! Message delivery
//!
//! Wraps the body in an envelope carrying sender identity and a reply
//! hint, then types it into the target pane. Remote routes delegate to
//! the remote host's own `send` tool over ssh.
//!
//! Delivery types the text, then presses Enter twice with a short pause
//! between: some agents buffer input and swallow the first newline.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::hosts::RemoteHostRegistry;
use crate::registry::LocalRegistry;
use crate::remote;
use crate::router::Route;
use crate::tmux::{self, CommandRunner};
use crate::types::RegisteredAgent;

/// Pause between typing the text and each submit key.
const SUBMIT_DELAY: Duration = Duration::from_millis(100);

/// Sender identity when no registration matches; messages from it are
/// sent verbatim and never logged.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Wrap a body so the receiving agent can parse the envelope and knows
/// how to reply with provenance.
pub fn format_envelope(sender: &str, receiver: &str, body: &str) -> String {
    format!(
        "{{Receiving msg from: {sender}}} \"{body}\" {{When ready to respond use: send --from {receiver} {sender} 'your return message'}}"
    )
}

/// Resolve the sender identity from the working directory.
///
/// Exact directory match first, then any registered ancestor; within a
/// tier the first registry entry in iteration order wins.
pub fn detect_sender<'a>(registry: &'a LocalRegistry, cwd: &Path) -> Option<&'a RegisteredAgent> {
    registry
        .list()
        .iter()
        .find(|a| a.is_local() && a.directory == cwd)
        .or_else(|| {
            registry
                .list()
                .iter()
                .find(|a| a.is_local() && cwd.starts_with(&a.directory))
        })
}

/// Deliver `body` along `route` on behalf of `sender` (a registered name,
/// or `None` when identity could not be resolved).
///
/// Local delivery succeeds once the type-keys primitive reports success;
/// whether the receiving agent consumed the input is not observable here.
pub fn deliver(
    runner: &dyn CommandRunner,
    route: &Route,
    hosts: &RemoteHostRegistry,
    sender: Option<&str>,
    body: &str,
) -> Result<()> {
    if route.is_local() {
        let text = match sender {
            Some(sender) => format_envelope(sender, &route.agent.name, body),
            None => body.to_string(),
        };

        tmux::type_keys(runner, &route.pane_address, &text)?;
        thread::sleep(SUBMIT_DELAY);
        tmux::submit_key(runner, &route.pane_address)?;
        thread::sleep(SUBMIT_DELAY);
        tmux::submit_key(runner, &route.pane_address)?;

        tracing::info!(pane = %route.pane_address, receiver = %route.agent.name, "message delivered");
        return Ok(());
    }

    let host = hosts
        .get(&route.host)
        .ok_or_else(|| Error::RemoteUnreachable {
            host: route.host.clone(),
            detail: "host is not in the ssh registry".to_string(),
        })?;

    remote::send_remote(runner, host, sender, &route.agent.name, body)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testing::ScriptedRunner;
    use crate::types::{AgentVariant, LOCAL_HOST};

    fn local_route(pane: &str, receiver: &str) -> Route {
        Route {
            host: LOCAL_HOST.into(),
            pane_address: pane.into(),
            agent: RegisteredAgent {
                name: receiver.into(),
                variant: AgentVariant::Claude,
                directory: PathBuf::from("/home/u/q"),
                host: LOCAL_HOST.into(),
            },
        }
    }

    fn empty_hosts() -> (tempfile::TempDir, RemoteHostRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let hosts = RemoteHostRegistry::open(dir.path().join("ssh-registry.json")).unwrap();
        (dir, hosts)
    }

    #[test]
    fn envelope_names_both_parties_and_the_reply_command() {
        let text = format_envelope("alpha", "beta", "hi");
        assert_eq!(
            text,
            "{Receiving msg from: alpha} \"hi\" {When ready to respond use: send --from beta alpha 'your return message'}"
        );
    }

    #[test]
    fn local_delivery_types_then_submits_twice() {
        let runner = ScriptedRunner::new().on("tmux send-keys", "");
        let (_dir, hosts) = empty_hosts();

        deliver(&runner, &local_route("s:1.1", "beta"), &hosts, Some("alpha"), "hi").unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].starts_with("tmux send-keys -t s:1.1 {Receiving msg from: alpha}"));
        assert!(calls[0].ends_with("'your return message'}"));
        assert_eq!(calls[1], "tmux send-keys -t s:1.1 C-m");
        assert_eq!(calls[2], "tmux send-keys -t s:1.1 C-m");
    }

    #[test]
    fn unknown_sender_sends_body_verbatim() {
        let runner = ScriptedRunner::new().on("tmux send-keys", "");
        let (_dir, hosts) = empty_hosts();

        deliver(&runner, &local_route("s:1.1", "beta"), &hosts, None, "hi").unwrap();

        assert_eq!(runner.calls()[0], "tmux send-keys -t s:1.1 hi");
    }

    #[test]
    fn vanished_pane_fails_delivery() {
        let runner = ScriptedRunner::new().fail("tmux send-keys", "can't find pane");
        let (_dir, hosts) = empty_hosts();

        let err = deliver(
            &runner,
            &local_route("s:9.9", "beta"),
            &hosts,
            Some("alpha"),
            "hi",
        )
        .unwrap_err();
        assert!(matches!(err, Error::PaneVanished(_)));
    }

    #[test]
    fn remote_route_delegates_over_ssh() {
        let runner = ScriptedRunner::new().on("ssh", "");
        let dir = tempfile::tempdir().unwrap();
        let mut hosts = RemoteHostRegistry::open(dir.path().join("ssh-registry.json")).unwrap();
        hosts.add("lab", "/keys/id", "ssh u@lab").unwrap();

        let route = Route {
            host: "lab".into(),
            pane_address: "gamma".into(),
            agent: RegisteredAgent {
                name: "gamma".into(),
                variant: AgentVariant::Claude,
                directory: PathBuf::from("/srv/x"),
                host: "lab".into(),
            },
        };

        deliver(&runner, &route, &hosts, None, "ping").unwrap();
        assert_eq!(runner.calls()[0], "ssh -i /keys/id u@lab send gamma 'ping'");
    }

    #[test]
    fn remote_route_without_host_record_fails() {
        let runner = ScriptedRunner::new();
        let (_dir, hosts) = empty_hosts();

        let route = Route {
            host: "lab".into(),
            pane_address: "gamma".into(),
            agent: RegisteredAgent {
                name: "gamma".into(),
                variant: AgentVariant::Claude,
                directory: PathBuf::from("/srv/x"),
                host: "lab".into(),
            },
        };

        let err = deliver(&runner, &route, &hosts, None, "ping").unwrap_err();
        assert!(matches!(err, Error::RemoteUnreachable { .. }));
    }

    #[test]
    fn sender_detection_prefers_exact_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = LocalRegistry::open(dir.path().join("registry.json")).unwrap();
        reg.add("parent", AgentVariant::Claude, Path::new("/home/u"), LOCAL_HOST)
            .unwrap();
        reg.add("exact", AgentVariant::Crush, Path::new("/home/u/p"), LOCAL_HOST)
            .unwrap();

        assert_eq!(
            detect_sender(&reg, Path::new("/home/u/p")).unwrap().name,
            "exact"
        );
        assert_eq!(
            detect_sender(&reg, Path::new("/home/u/p/deeper")).unwrap().name,
            "parent"
        );
        assert!(detect_sender(&reg, Path::new("/srv")).is_none());
    }

    #[test]
    fn sender_detection_ignores_remote_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = LocalRegistry::open(dir.path().join("registry.json")).unwrap();
        reg.add("gamma", AgentVariant::Claude, Path::new("/srv/x"), "lab")
            .unwrap();

        assert!(detect_sender(&reg, Path::new("/srv/x")).is_none());
    }
}
