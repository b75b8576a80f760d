//! send - deliver a message to a named AI agent pane
//!
//! Resolves the receiver through the registries, types the enveloped
//! message into the target pane, and records it in the conversation
//! history when both parties are registered.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use crosstalk_core::discovery;
use crosstalk_core::router::{self, Route};
use crosstalk_core::sender;
use crosstalk_core::tmux::{self, CommandRunner, SystemRunner};
use crosstalk_core::{Config, Error, LocalRegistry, MessageStore, PaneFacts, RemoteHostRegistry};

#[derive(Parser, Debug)]
#[command(name = "send")]
#[command(about = "Send a message to a named AI agent")]
#[command(version)]
struct Args {
    /// Sender name for the envelope and the conversation history
    #[arg(long, value_name = "SENDER")]
    from: Option<String>,

    /// Show registered agents and live panes instead of sending
    #[arg(long)]
    status: bool,

    /// Receiver's registered name
    receiver: Option<String>,

    /// Message text; remaining arguments are joined with single spaces
    #[arg(trailing_var_arg = true)]
    body: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = crosstalk_core::logging::init(&config.logging).ok();

    let result = if args.status {
        show_status()
    } else {
        run_send(&args, &config)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_send(args: &Args, config: &Config) -> anyhow::Result<()> {
    let receiver = args
        .receiver
        .as_deref()
        .context("usage: send <receiver> <message>, send --from <sender> <receiver> <message>, or send --status")?;
    if args.body.is_empty() {
        anyhow::bail!("missing message\nusage: send <receiver> <message>");
    }
    let body = args.body.join(" ");

    let registry = LocalRegistry::open_default().context("failed to load registry")?;
    let hosts = RemoteHostRegistry::open_default().context("failed to load ssh registry")?;

    // History is best-effort: a broken store must not block delivery
    let store = match MessageStore::open_default(config.retention.horizon_days) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Warning: {e}; message will not be logged");
            None
        }
    };

    let runner = SystemRunner;
    let live = tmux::probe(&runner)?;

    let route = match router::route(receiver, &registry, &hosts, &live, &runner) {
        Ok(route) => route,
        Err(Error::NameUnknown(name)) => {
            eprintln!("Error: agent '{name}' not found in registry");
            eprintln!("Registered agents:");
            for agent in registry.list() {
                eprintln!("  - {}", agent.name);
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    // Identity: an explicit --from wins; otherwise the working directory
    // decides. Unresolved senders deliver verbatim and are never logged.
    let explicit = args.from.as_deref();
    let detected = if explicit.is_none() {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        sender::detect_sender(&registry, &cwd).cloned()
    } else {
        None
    };
    let sender_name = explicit.or(detected.as_ref().map(|a| a.name.as_str()));

    sender::deliver(&runner, &route, &hosts, sender_name, &body)?;
    println!("Message sent to {receiver}");

    if let (Some(store), Some(name)) = (&store, sender_name) {
        log_message(store, &registry, name, &route, &body);
    }

    Ok(())
}

/// Record the message when the sender resolves to a registered identity.
fn log_message(
    store: &MessageStore,
    registry: &LocalRegistry,
    sender_name: &str,
    route: &Route,
    body: &str,
) {
    let Some(sender) = registry.resolve_by_name(sender_name) else {
        tracing::debug!(sender = sender_name, "sender not registered; skipping history");
        return;
    };

    if let Err(e) = store.log(
        &sender.name,
        &sender.directory.to_string_lossy(),
        &route.agent.name,
        &route.agent.directory.to_string_lossy(),
        body,
    ) {
        eprintln!("Warning: failed to log message: {e}");
    }
}

fn show_status() -> anyhow::Result<()> {
    let registry = LocalRegistry::open_default().context("failed to load registry")?;
    let hosts = RemoteHostRegistry::open_default().context("failed to load ssh registry")?;
    let runner = SystemRunner;

    println!("=== MESSAGING SYSTEM STATUS ===");
    println!();

    let local_panes = match tmux::probe(&runner) {
        Ok(panes) => panes,
        Err(Error::MultiplexerDown) => {
            println!("tmux server is not running");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    if registry.list().is_empty() {
        println!("No registered agents");
    } else {
        println!("Registered agents ({}):", registry.list().len());
        for agent in registry.list() {
            print!(
                "  - {}: {} @ {}",
                agent.name,
                agent.variant,
                agent.directory.display()
            );
            if !agent.is_local() {
                println!(" [{}]", agent.host);
            } else if let Some(pane) = router::find_local_pane(agent, &local_panes) {
                println!(" \u{2713} Active in {}", pane.pane.pane_address);
            } else {
                println!(" \u{2717} Not found");
            }
        }
    }

    let shared: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let remote_panes = discovery::probe_remotes(&shared, &hosts);

    println!();
    println!("Live agent panes:");
    if local_panes.is_empty() && remote_panes.is_empty() {
        println!("No AI agents detected");
        return Ok(());
    }

    print_pane_group("host", &local_panes);
    for host in hosts.list() {
        let panes: Vec<PaneFacts> = remote_panes
            .iter()
            .filter(|p| p.pane.host == host.name)
            .cloned()
            .collect();
        print_pane_group(&host.name, &panes);
    }

    Ok(())
}

fn print_pane_group(host: &str, panes: &[PaneFacts]) {
    if panes.is_empty() {
        return;
    }
    println!("  {host}:");
    for pane in panes {
        println!(
            "    {}: {} @ {}",
            pane.pane.pane_address,
            pane.variant,
            shorten_dir(&pane.directory.to_string_lossy())
        );
    }
}

/// Abbreviate a path for table display: home becomes `~`, long tails are
/// elided from the left.
fn shorten_dir(dir: &str) -> String {
    let mut short = dir.to_string();
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            short = short.replacen(&home, "~", 1);
        }
    }
    if short.len() > 40 {
        let tail: String = short
            .chars()
            .rev()
            .take(37)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        short = format!("...{tail}");
    }
    short
}
