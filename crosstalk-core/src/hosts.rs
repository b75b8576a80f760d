//! Remote-host registry
//!
//! Persists nickname ↔ (ssh key, connect invocation) bindings in
//! `~/.local/share/crosstalk/ssh-registry.json`. Hosts are only ever
//! added and removed explicitly; no sweep touches this file.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::persist;
use crate::types::{RemoteHost, LOCAL_HOST};

pub struct RemoteHostRegistry {
    hosts: Vec<RemoteHost>,
    path: PathBuf,
}

impl RemoteHostRegistry {
    /// Open the registry at the default path.
    pub fn open_default() -> Result<Self> {
        Self::open(Config::hosts_path())
    }

    /// Open (or create empty) a registry at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let hosts = persist::load_array(&path)?;
        Ok(Self { hosts, path })
    }

    /// Add a host, replacing any existing entry with the same nickname.
    /// Nicknames are case-sensitive and must not shadow the local sentinel.
    pub fn add(&mut self, name: &str, ssh_key: &str, connect_command: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Config("host nickname must not be empty".to_string()));
        }
        if name == LOCAL_HOST {
            return Err(Error::Config(format!(
                "'{LOCAL_HOST}' is reserved for the local machine"
            )));
        }
        if connect_command.trim().is_empty() {
            return Err(Error::Config(
                "connect command must not be empty".to_string(),
            ));
        }

        self.hosts.retain(|h| h.name != name);
        self.hosts.push(RemoteHost {
            name: name.to_string(),
            ssh_key: ssh_key.to_string(),
            connect_command: connect_command.to_string(),
        });
        self.save()
    }

    /// Remove a host by nickname. Idempotent.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let before = self.hosts.len();
        self.hosts.retain(|h| h.name != name);
        if self.hosts.len() != before {
            self.save()?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RemoteHost> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn list(&self) -> &[RemoteHost] {
        &self.hosts
    }

    fn save(&self) -> Result<()> {
        persist::store_array(&self.path, &self.hosts)
    }
}
