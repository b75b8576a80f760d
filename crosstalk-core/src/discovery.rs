//! Discovery aggregator
//!
//! Combines the local probe with one remote probe per registered host
//! into a single decorated agent table, then reconciles the local
//! registry against what is actually live. Remote probes run on one
//! thread per host so a slow host cannot stall the rest; results are
//! appended as they arrive.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::hosts::RemoteHostRegistry;
use crate::registry::LocalRegistry;
use crate::remote::{self, REMOTE_PROBE_DEADLINE};
use crate::tmux::{self, CommandRunner};
use crate::types::{Activity, AgentVariant, PaneFacts, LOCAL_HOST};

/// Placeholder display name for a live pane that carries no registration.
pub const NOT_REGISTERED: &str = "NR";

/// One row of the unified agent table.
#[derive(Debug, Clone)]
pub struct AgentRow {
    pub pane_address: String,
    pub directory: PathBuf,
    pub variant: AgentVariant,
    /// Registered name, or [`NOT_REGISTERED`].
    pub display_name: String,
    pub activity: Activity,
    pub host: String,
    pub registered: bool,
}

/// Aggregated discovery result.
#[derive(Debug)]
pub struct Discovery {
    pub rows: Vec<AgentRow>,
    /// True when the local tmux server was unreachable; remote rows may
    /// still be present.
    pub multiplexer_down: bool,
}

/// Build the unified agent view.
///
/// Remote hosts that fail to answer are logged and skipped. When
/// `adopt_remote` is set, remote registrations absent from the local
/// registry are copied in; the default leaves the registry untouched by
/// probes.
pub fn discover(
    runner: Arc<dyn CommandRunner>,
    registry: &mut LocalRegistry,
    hosts: &RemoteHostRegistry,
    adopt_remote: bool,
) -> Result<Discovery> {
    let (local_panes, multiplexer_down) = match tmux::probe(runner.as_ref()) {
        Ok(panes) => (panes, false),
        Err(Error::MultiplexerDown) => (Vec::new(), true),
        Err(e) => return Err(e),
    };

    let mut all_panes = local_panes.clone();
    all_panes.extend(probe_remotes(&runner, hosts));

    let rows = all_panes
        .iter()
        .map(|p| {
            let registration =
                registry.resolve_by_slot(p.variant, &p.directory, &p.pane.host);
            AgentRow {
                pane_address: p.pane.pane_address.clone(),
                directory: p.directory.clone(),
                variant: p.variant,
                display_name: registration
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| NOT_REGISTERED.to_string()),
                activity: p.activity,
                host: p.pane.host.clone(),
                registered: registration.is_some(),
            }
        })
        .collect();

    // Prune stale local registrations against what is actually live. A
    // down tmux server says nothing about pane liveness, so skip.
    if !multiplexer_down {
        registry.reconcile(&local_panes)?;
    }

    if adopt_remote {
        adopt_remote_registrations(registry, &all_panes);
    }

    Ok(Discovery {
        rows,
        multiplexer_down,
    })
}

/// Fan out one probe thread per host and collect whatever answers in time.
pub fn probe_remotes(
    runner: &Arc<dyn CommandRunner>,
    hosts: &RemoteHostRegistry,
) -> Vec<PaneFacts> {
    let (tx, rx) = mpsc::channel();
    let mut spawned = 0;

    for host in hosts.list() {
        let tx = tx.clone();
        let runner = Arc::clone(runner);
        let host = host.clone();
        spawned += 1;
        thread::spawn(move || {
            let result = remote::probe_remote(runner.as_ref(), &host);
            let _ = tx.send((host.name, result));
        });
    }
    drop(tx);

    // Each probe enforces its own deadline; the slack covers thread
    // scheduling.
    let collect_deadline = REMOTE_PROBE_DEADLINE + Duration::from_secs(1);
    let mut panes = Vec::new();
    for _ in 0..spawned {
        match rx.recv_timeout(collect_deadline) {
            Ok((_, Ok(remote_panes))) => panes.extend(remote_panes),
            Ok((host, Err(e))) => {
                tracing::warn!(host = %host, error = %e, "remote probe failed");
            }
            Err(_) => {
                tracing::warn!("remote probe collection timed out");
                break;
            }
        }
    }
    panes
}

fn adopt_remote_registrations(registry: &mut LocalRegistry, panes: &[PaneFacts]) {
    for pane in panes.iter().filter(|p| p.pane.host != LOCAL_HOST) {
        if registry.resolve_by_name(&pane.pane.display_label).is_some() {
            continue;
        }
        if let Err(e) = registry.add(
            &pane.pane.display_label,
            pane.variant,
            &pane.directory,
            &pane.pane.host,
        ) {
            tracing::warn!(name = %pane.pane.display_label, error = %e, "could not adopt remote registration");
        }
    }
}
