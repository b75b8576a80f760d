//! send-remote - cross-machine messaging and discovery
//!
//! The same send surface as `send`, plus `--discover` for listing a
//! remote host's registry and a cross-machine `--status` view.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use crosstalk_core::remote;
use crosstalk_core::router;
use crosstalk_core::sender;
use crosstalk_core::tmux::{self, SystemRunner};
use crosstalk_core::{
    Config, Error, LocalRegistry, MessageStore, RegisteredAgent, RemoteHostRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "send-remote")]
#[command(about = "Send messages to AI agents across machines")]
#[command(version)]
struct Args {
    /// Sender name for the envelope and the conversation history
    #[arg(long, value_name = "SENDER")]
    from: Option<String>,

    /// Show agents on every machine instead of sending
    #[arg(long)]
    status: bool,

    /// List the registered agents of one remote host
    #[arg(long, value_name = "HOST")]
    discover: Option<String>,

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
        show_cross_machine_status()
    } else if let Some(host) = args.discover.as_deref() {
        discover_host(host)
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
    let receiver = args.receiver.as_deref().context(
        "usage: send-remote <receiver> <message>, send-remote --discover <host>, or send-remote --status",
    )?;
    if args.body.is_empty() {
        anyhow::bail!("missing message\nusage: send-remote <receiver> <message>");
    }
    let body = args.body.join(" ");

    let registry = LocalRegistry::open_default().context("failed to load registry")?;
    let hosts = RemoteHostRegistry::open_default().context("failed to load ssh registry")?;

    let store = match MessageStore::open_default(config.retention.horizon_days) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Warning: {e}; message will not be logged");
            None
        }
    };

    // A dead local tmux only matters when the route ends on this machine
    let runner = SystemRunner;
    let (live, tmux_down) = match tmux::probe(&runner) {
        Ok(panes) => (panes, false),
        Err(Error::MultiplexerDown) => (Vec::new(), true),
        Err(e) => return Err(e.into()),
    };

    let route = router::route(receiver, &registry, &hosts, &live, &runner)?;
    if route.is_local() && tmux_down {
        anyhow::bail!("tmux server is not running");
    }

    let explicit = args.from.as_deref();
    let detected: Option<RegisteredAgent> = if explicit.is_none() {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        sender::detect_sender(&registry, &cwd).cloned()
    } else {
        None
    };
    let sender_name = explicit.or(detected.as_ref().map(|a| a.name.as_str()));

    sender::deliver(&runner, &route, &hosts, sender_name, &body)?;
    tracing::info!(receiver, host = %route.host, "message sent");
    if route.is_local() {
        println!("Message sent to {receiver} (local)");
    } else {
        println!("Message sent to {receiver} on {}", route.host);
    }

    if let (Some(store), Some(name)) = (&store, sender_name) {
        if let Some(sender) = registry.resolve_by_name(name) {
            if let Err(e) = store.log(
                &sender.name,
                &sender.directory.to_string_lossy(),
                &route.agent.name,
                &route.agent.directory.to_string_lossy(),
                &body,
            ) {
                eprintln!("Warning: failed to log message: {e}");
            }
        }
    }

    Ok(())
}

fn discover_host(name: &str) -> anyhow::Result<()> {
    let hosts = RemoteHostRegistry::open_default().context("failed to load ssh registry")?;
    let Some(host) = hosts.get(name) else {
        anyhow::bail!("SSH connection '{name}' not found");
    };

    println!("Discovering agents on {name}...");
    let runner = SystemRunner;
    let agents = remote::fetch_registry(&runner, host)?;

    if agents.is_empty() {
        println!("No agents found on {name}");
    } else {
        println!("Found {} agents on {name}:", agents.len());
        for agent in &agents {
            println!(
                "  {} ({}) - {}",
                agent.name,
                agent.variant,
                agent.directory.display()
            );
        }
    }

    Ok(())
}

fn show_cross_machine_status() -> anyhow::Result<()> {
    let registry = LocalRegistry::open_default().context("failed to load registry")?;
    let hosts = RemoteHostRegistry::open_default().context("failed to load ssh registry")?;
    let runner = SystemRunner;

    println!("Cross-Machine Agent Status");
    println!("==========================");

    println!();
    println!("Local agents (host):");
    let local: Vec<&RegisteredAgent> = registry.list().iter().filter(|a| a.is_local()).collect();
    if local.is_empty() {
        println!("  (none)");
    }
    for agent in local {
        println!(
            "  {} ({}) - {}",
            agent.name,
            agent.variant,
            agent.directory.display()
        );
    }

    println!();
    println!("SSH connections:");
    if hosts.list().is_empty() {
        println!("  (none)");
    }
    for host in hosts.list() {
        println!("  {} - {}", host.name, host.connect_command);
    }

    for host in hosts.list() {
        println!();
        println!("Agents on {}:", host.name);
        match remote::fetch_registry(&runner, host) {
            Ok(agents) if !agents.is_empty() => {
                for agent in &agents {
                    println!(
                        "  {} ({}) - {}",
                        agent.name,
                        agent.variant,
                        agent.directory.display()
                    );
                }
            }
            _ => println!("  (none found or connection failed)"),
        }
    }

    Ok(())
}
