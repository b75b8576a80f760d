//! Local agent registry
//!
//! Persists name ↔ (variant, directory, host) bindings in a single JSON
//! array at `~/.local/share/crosstalk/registry.json`. The name is the
//! routing key; both the name and the slot are unique.
//!
//! Files written before multi-host support lack the `machine` field; such
//! entries are read as local and the document is rewritten once.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::persist;
use crate::types::{AgentVariant, PaneFacts, RegisteredAgent};

pub struct LocalRegistry {
    agents: Vec<RegisteredAgent>,
    path: PathBuf,
}

impl LocalRegistry {
    /// Open the registry at the default path.
    pub fn open_default() -> Result<Self> {
        Self::open(Config::registry_path())
    }

    /// Open (or create empty) a registry at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let raw: Vec<serde_json::Value> = persist::load_array(&path)?;
        let needs_migration = raw
            .iter()
            .any(|v| v.get("machine").is_none());

        let agents = raw
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<RegisteredAgent>, _>>()
            .map_err(|e| Error::RegistryCorrupt(format!("{}: {}", path.display(), e)))?;

        let registry = Self { agents, path };
        if needs_migration {
            tracing::info!("migrating registry entries without a machine field");
            registry.save()?;
        }
        Ok(registry)
    }

    /// Bind `name` to an agent slot.
    ///
    /// Re-adding the same name with the same slot is an idempotent
    /// replace. A name bound to a different slot is [`Error::DuplicateName`];
    /// a slot bound to a different name is [`Error::SlotOccupied`].
    pub fn add(
        &mut self,
        name: &str,
        variant: AgentVariant,
        directory: &Path,
        host: &str,
    ) -> Result<()> {
        if !variant.is_routable() {
            return Err(Error::Config(
                "cannot register an agent of unknown variant".to_string(),
            ));
        }

        if let Some(existing) = self.resolve_by_name(name) {
            if existing.slot() != (variant, directory, host) {
                return Err(Error::DuplicateName {
                    name: name.to_string(),
                    variant: existing.variant,
                    directory: existing.directory.clone(),
                });
            }
            // same name, same slot: nothing to change
            return Ok(());
        }

        if let Some(existing) = self.resolve_by_slot(variant, directory, host) {
            return Err(Error::SlotOccupied {
                name: existing.name.clone(),
                variant,
                directory: directory.to_path_buf(),
                host: host.to_string(),
            });
        }

        self.agents.push(RegisteredAgent {
            name: name.to_string(),
            variant,
            directory: directory.to_path_buf(),
            host: host.to_string(),
        });
        self.save()
    }

    /// Remove whatever name is bound to a slot. Idempotent.
    pub fn remove(&mut self, variant: AgentVariant, directory: &Path, host: &str) -> Result<()> {
        let before = self.agents.len();
        self.agents
            .retain(|a| a.slot() != (variant, directory, host));
        if self.agents.len() != before {
            self.save()?;
        }
        Ok(())
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<&RegisteredAgent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn resolve_by_slot(
        &self,
        variant: AgentVariant,
        directory: &Path,
        host: &str,
    ) -> Option<&RegisteredAgent> {
        self.agents
            .iter()
            .find(|a| a.slot() == (variant, directory, host))
    }

    pub fn list(&self) -> &[RegisteredAgent] {
        &self.agents
    }

    /// Drop local entries whose slot no longer matches a live pane.
    ///
    /// Remote-host entries are left alone: a local probe says nothing
    /// about panes on other machines.
    pub fn reconcile(&mut self, live: &[PaneFacts]) -> Result<()> {
        let before = self.agents.len();
        self.agents.retain(|a| {
            if !a.is_local() {
                return true;
            }
            live.iter().any(|p| {
                p.variant == a.variant && p.directory == a.directory && p.pane.host == a.host
            })
        });

        if self.agents.len() != before {
            tracing::info!(
                pruned = before - self.agents.len(),
                "reconcile removed stale registrations"
            );
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        persist::store_array(&self.path, &self.agents)
    }
}
