//! Core ownership tree for labtree.
//! This crate is the single source of truth for tree invariants: ownership,
//! sibling naming, undo history and change propagation.

pub mod command;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod projection;
pub mod repo;
pub mod serialize;
pub mod service;

pub use command::log::{CommandLog, LogEntry};
pub use command::{CommandState, TreeCommand};
pub use config::TreeConfig;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::kind::{ChildFilter, KindCapabilities, NodeKind};
pub use model::naming::{unique_name_for, NameHandling};
pub use model::node::{DescriptionField, Node, NodeUuid};
pub use notify::{EventRecorder, SubscriptionId, TreeEvent, TreeObserver};
pub use projection::{
    ItemFlags, ItemRole, ModelIndex, NameFilter, ProjectionEvent, TreeProjection,
};
pub use repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
pub use repo::tree_repo::{Lifecycle, NodeId, TreeError, TreeResult, TreeStore};
pub use serialize::node_io::{ImportedSubtree, LoadedProject};
pub use serialize::{Element, SerializeError, SerializeResult};
pub use service::settings_service::{SettingsError, SettingsService};
pub use service::tree_service::AspectTree;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
