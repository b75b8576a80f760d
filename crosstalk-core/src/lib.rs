//! # crosstalk-core
//!
//! Core library for crosstalk - a message broker between AI coding
//! agents running in tmux panes, locally and across SSH-reachable hosts.
//!
//! This library provides:
//! - Pane discovery and agent classification
//! - Name registries for agents and remote hosts
//! - Routing, delivery, and the on-wire envelope
//! - Durable conversation history in SQLite
//!
//! ## Example
//!
//! ```rust,no_run
//! use crosstalk_core::{router, sender, tmux, LocalRegistry, RemoteHostRegistry};
//! use crosstalk_core::tmux::SystemRunner;
//!
//! let runner = SystemRunner;
//! let registry = LocalRegistry::open_default().expect("registry");
//! let hosts = RemoteHostRegistry::open_default().expect("hosts");
//!
//! let live = tmux::probe(&runner).expect("probe");
//! let route = router::route("beta", &registry, &hosts, &live, &runner).expect("route");
//! sender::deliver(&runner, &route, &hosts, Some("alpha"), "hi").expect("deliver");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{ConversationSummary, MessageStore, StoredConversation, StoredMessage};
pub use error::{Error, Result};
pub use hosts::RemoteHostRegistry;
pub use registry::LocalRegistry;
pub use types::*;

// Public modules
pub mod classify;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod hosts;
pub mod logging;
pub mod registry;
pub mod remote;
pub mod router;
pub mod sender;
pub mod testing;
pub mod tmux;
pub mod types;

mod persist;
