//! Node domain model shared by tree, command and projection layers.
//!
//! # Responsibility
//! - Define the node description record and the closed set of node kinds.
//! - Provide pure helpers (unique naming, caption rendering) with no tree
//!   access.
//!
//! # Invariants
//! - Every node is identified by a stable uuid.
//! - Kind dispatch goes through `KindCapabilities`, never runtime type names.

pub mod caption;
pub mod kind;
pub mod naming;
pub mod node;
