//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate tree commands and settings storage into use-case level APIs.
//! - Keep consumers decoupled from arena and storage details.

pub mod settings_service;
pub mod tree_service;
