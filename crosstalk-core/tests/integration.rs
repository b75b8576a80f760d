//! End-to-end tests for the send pipeline
//!
//! Drive probe → route → deliver → history against a scripted command
//! runner, temp-dir registries, and an in-memory message store, mirroring
//! what the CLI front-ends do.

use std::path::Path;

use crosstalk_core::router;
use crosstalk_core::sender;
use crosstalk_core::testing::ScriptedRunner;
use crosstalk_core::tmux;
use crosstalk_core::{
    AgentVariant, Error, LocalRegistry, MessageStore, RemoteHostRegistry, LOCAL_HOST,
};

struct Env {
    _dir: tempfile::TempDir,
    registry: LocalRegistry,
    hosts: RemoteHostRegistry,
    store: MessageStore,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::open(dir.path().join("registry.json")).unwrap();
        let hosts = RemoteHostRegistry::open(dir.path().join("ssh-registry.json")).unwrap();
        let store = MessageStore::open_in_memory().unwrap();
        Self {
            _dir: dir,
            registry,
            hosts,
            store,
        }
    }
}

fn pane_line(session: &str, wp: &str, dir: &str, cmd: &str, status: &str) -> String {
    format!("{session}:$3:{wp}:{dir}:{cmd}:{status}")
}

/// What the CLI does for one send: probe, route, deliver, then log when
/// the sender is a registered identity.
fn send(
    env: &Env,
    runner: &ScriptedRunner,
    from: Option<&str>,
    receiver: &str,
    body: &str,
) -> crosstalk_core::Result<()> {
    let live = tmux::probe(runner)?;
    let route = router::route(receiver, &env.registry, &env.hosts, &live, runner)?;
    sender::deliver(runner, &route, &env.hosts, from, body)?;

    if let Some(sender) = from.and_then(|name| env.registry.resolve_by_name(name)) {
        env.store
            .log(
                &sender.name,
                &sender.directory.to_string_lossy(),
                &route.agent.name,
                &route.agent.directory.to_string_lossy(),
                body,
            )
            .map(|_| ())?;
    }
    Ok(())
}

#[test]
fn local_round_trip_delivers_and_records_history() {
    let mut env = Env::new();
    env.registry
        .add("alpha", AgentVariant::Claude, Path::new("/home/u/p"), LOCAL_HOST)
        .unwrap();
    env.registry
        .add("beta", AgentVariant::Claude, Path::new("/home/u/q"), LOCAL_HOST)
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on(
            "tmux list-panes",
            [
                pane_line("s", "1.0", "/home/u/p", "claude", "active"),
                pane_line("s", "1.1", "/home/u/q", "claude", "idle"),
            ]
            .join("\n"),
        )
        .on("tmux send-keys", "");

    send(&env, &runner, Some("alpha"), "beta", "hi").unwrap();

    // the wrapped text landed in beta's pane, not alpha's
    let typed = runner.calls_matching("tmux send-keys -t s:1.1");
    assert_eq!(typed.len(), 3, "text plus two submits");
    assert!(typed[0].contains("{Receiving msg from: alpha} \"hi\""));
    assert!(typed[0].ends_with(
        "{When ready to respond use: send --from beta alpha 'your return message'}"
    ));
    assert!(runner.calls_matching("tmux send-keys -t s:1.0").is_empty());

    // one conversation with both endpoints, one message with the raw body
    let conversations = env.store.list_conversations(100).unwrap();
    assert_eq!(conversations.len(), 1);
    let conv = &conversations[0].conversation;
    assert_eq!(conv.peer_a_name, "alpha");
    assert_eq!(conv.peer_a_dir, "/home/u/p");
    assert_eq!(conv.peer_b_name, "beta");
    assert_eq!(conv.peer_b_dir, "/home/u/q");

    let messages = env.store.get_messages(conv.id).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "hi");
}

#[test]
fn exact_directory_wins_over_descendant_pane() {
    let mut env = Env::new();
    env.registry
        .add("alpha", AgentVariant::Claude, Path::new("/home/u/p"), LOCAL_HOST)
        .unwrap();
    env.registry
        .add("beta", AgentVariant::Claude, Path::new("/home/u/q"), LOCAL_HOST)
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on(
            "tmux list-panes",
            [
                pane_line("s", "1.0", "/home/u/p", "claude", "active"),
                pane_line("s", "1.1", "/home/u/q", "claude", "idle"),
                pane_line("s", "2.0", "/home/u/p/sub", "claude", "idle"),
            ]
            .join("\n"),
        )
        .on("tmux send-keys", "");

    send(&env, &runner, Some("beta"), "alpha", "x").unwrap();

    assert_eq!(runner.calls_matching("tmux send-keys -t s:1.0").len(), 3);
    assert!(runner.calls_matching("tmux send-keys -t s:2.0").is_empty());
}

#[test]
fn remote_delivery_delegates_over_ssh() {
    let mut env = Env::new();
    env.hosts.add("lab", "/keys/id", "ssh u@h").unwrap();
    env.registry
        .add("gamma", AgentVariant::Claude, Path::new("/srv/x"), "lab")
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on("tmux list-panes", "")
        .on("ssh", "");

    // sender unresolved: delivery still happens, history stays empty
    send(&env, &runner, None, "gamma", "ping").unwrap();

    assert_eq!(
        runner.calls_matching("ssh"),
        vec!["ssh -i /keys/id u@h send gamma 'ping'".to_string()]
    );
    assert!(env.store.list_conversations(100).unwrap().is_empty());
}

#[test]
fn remote_delivery_with_registered_sender_is_recorded() {
    let mut env = Env::new();
    env.hosts.add("lab", "", "ssh u@h").unwrap();
    env.registry
        .add("alpha", AgentVariant::Claude, Path::new("/home/u/p"), LOCAL_HOST)
        .unwrap();
    env.registry
        .add("gamma", AgentVariant::Claude, Path::new("/srv/x"), "lab")
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on("tmux list-panes", "")
        .on("ssh", "");

    send(&env, &runner, Some("alpha"), "gamma", "ping").unwrap();

    assert_eq!(
        runner.calls_matching("ssh"),
        vec!["ssh u@h send --from alpha gamma 'ping'".to_string()]
    );

    let conversations = env.store.list_conversations(100).unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].conversation.peer_b_name, "gamma");
    assert_eq!(conversations[0].conversation.peer_b_dir, "/srv/x");
}

#[test]
fn unknown_receiver_fails_without_touching_history() {
    let env = Env::new();
    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on("tmux list-panes", "");

    let err = send(&env, &runner, None, "nobody", "hi").unwrap_err();
    assert!(matches!(err, Error::NameUnknown(name) if name == "nobody"));
    assert!(env.store.list_conversations(100).unwrap().is_empty());
}

#[test]
fn registered_name_without_live_pane_is_pane_not_found() {
    let mut env = Env::new();
    env.registry
        .add("alpha", AgentVariant::Claude, Path::new("/home/u/p"), LOCAL_HOST)
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on("tmux list-panes", "")
        .on("tmux send-keys", "");

    let err = send(&env, &runner, None, "alpha", "hi").unwrap_err();
    assert!(matches!(err, Error::PaneNotFound { name, .. } if name == "alpha"));
}

#[test]
fn generic_interpreter_pane_routes_by_child_process() {
    let mut env = Env::new();
    env.registry
        .add("alpha", AgentVariant::Claude, Path::new("/home/u/p"), LOCAL_HOST)
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on(
            "tmux list-panes",
            pane_line("s", "1.0", "/home/u/p", "node", "active"),
        )
        .on("tmux display-message -p -t s:1.0", "900\n")
        .on("pgrep -P 900", "901\n")
        .on("ps -p 901", "node /usr/local/bin/claude\n")
        .on("tmux send-keys", "");

    send(&env, &runner, None, "alpha", "hi").unwrap();
    assert_eq!(runner.calls_matching("tmux send-keys -t s:1.0").len(), 3);
}

#[test]
fn unreachable_remote_leaves_no_history() {
    let mut env = Env::new();
    env.hosts.add("lab", "", "ssh u@h").unwrap();
    env.registry
        .add("alpha", AgentVariant::Claude, Path::new("/home/u/p"), LOCAL_HOST)
        .unwrap();
    env.registry
        .add("gamma", AgentVariant::Claude, Path::new("/srv/x"), "lab")
        .unwrap();

    let runner = ScriptedRunner::new()
        .on("tmux has-session", "")
        .on("tmux list-panes", "")
        .fail("ssh", "connection refused");

    let err = send(&env, &runner, Some("alpha"), "gamma", "hi").unwrap_err();
    assert!(matches!(err, Error::RemoteUnreachable { host, .. } if host == "lab"));
    assert!(env.store.list_conversations(100).unwrap().is_empty());
}

#[test]
fn send_fails_when_tmux_is_down() {
    let env = Env::new();
    let runner = ScriptedRunner::new().fail("tmux has-session", "no server running");

    let err = send(&env, &runner, None, "anyone", "hi").unwrap_err();
    assert!(matches!(err, Error::MultiplexerDown));
}
