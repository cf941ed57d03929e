//! Storage layer: the in-memory node arena and persisted settings.
//!
//! # Responsibility
//! - Own node storage and parent/child linkage for one tree.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Storage APIs return semantic errors (`NodeNotFound`, `NotAChild`) in
//!   addition to transport errors.

pub mod settings_repo;
pub mod tree_repo;
