//! Message routing
//!
//! Resolves a target name to a single pane on a single host. Directory
//! matching is always performed: an earlier variant-only shortcut
//! misrouted whenever two panes of the same variant were live. The
//! tie-break chain is exact directory, then descendant directory, then
//! first in probe order.

use crate::error::{Error, Result};
use crate::hosts::RemoteHostRegistry;
use crate::registry::LocalRegistry;
use crate::remote;
use crate::tmux::CommandRunner;
use crate::types::{PaneFacts, RegisteredAgent, LOCAL_HOST};

/// Where a message should go.
#[derive(Debug, Clone)]
pub struct Route {
    /// Host nickname; [`LOCAL_HOST`] for local delivery.
    pub host: String,
    /// tmux target for local routes; the registered name for remote
    /// routes, where the remote's own tool finishes resolution.
    pub pane_address: String,
    /// The registration that owns this route.
    pub agent: RegisteredAgent,
}

impl Route {
    pub fn is_local(&self) -> bool {
        self.host == LOCAL_HOST
    }
}

/// Resolve `name` against the local registry and live panes. When the
/// local registry has no binding, each remote host's registry is
/// consulted in turn.
pub fn route(
    name: &str,
    local: &LocalRegistry,
    hosts: &RemoteHostRegistry,
    live_panes: &[PaneFacts],
    runner: &dyn CommandRunner,
) -> Result<Route> {
    if let Some(agent) = local.resolve_by_name(name) {
        if agent.is_local() {
            let pane = find_local_pane(agent, live_panes).ok_or_else(|| Error::PaneNotFound {
                name: agent.name.clone(),
                variant: agent.variant,
                directory: agent.directory.clone(),
            })?;
            return Ok(Route {
                host: LOCAL_HOST.to_string(),
                pane_address: pane.pane.pane_address.clone(),
                agent: agent.clone(),
            });
        }

        return Ok(Route {
            host: agent.host.clone(),
            pane_address: agent.name.clone(),
            agent: agent.clone(),
        });
    }

    for host in hosts.list() {
        let agents = match remote::fetch_registry(runner, host) {
            Ok(agents) => agents,
            Err(e) => {
                tracing::warn!(host = %host.name, error = %e, "remote registry lookup failed");
                continue;
            }
        };
        if let Some(agent) = agents.into_iter().find(|a| a.name == name) {
            return Ok(Route {
                host: host.name.clone(),
                pane_address: agent.name.clone(),
                agent: RegisteredAgent {
                    host: host.name.clone(),
                    ..agent
                },
            });
        }
    }

    Err(Error::NameUnknown(name.to_string()))
}

/// Find the live pane for a local registration.
///
/// Exact directory matches win over descendant matches; within a tier the
/// first pane in probe order wins (a documented, stable tie-break).
pub fn find_local_pane<'a>(
    agent: &RegisteredAgent,
    live_panes: &'a [PaneFacts],
) -> Option<&'a PaneFacts> {
    live_panes
        .iter()
        .find(|p| p.variant == agent.variant && p.directory == agent.directory)
        .or_else(|| {
            live_panes.iter().find(|p| {
                p.variant == agent.variant
                    && p.directory != agent.directory
                    && p.directory.starts_with(&agent.directory)
            })
        })
}
