//! Tree configuration injected into [`crate::AspectTree`].
//!
//! # Invariants
//! - Values are read once at tree construction; later settings changes do
//!   not reach an existing tree.

use crate::model::node::DEFAULT_CAPTION_SPEC;
use crate::repo::settings_repo::SettingsRepository;
use crate::service::settings_service::{SettingsResult, SettingsService};

/// Settings group holding project-wide tree options.
pub const PROJECT_GROUP: &str = "Project";
/// Maximum number of undo entries, `0` for unlimited.
pub const KEY_UNDO_LIMIT: &str = "UndoLimit";
/// Whether new projects record undo history at all.
pub const KEY_UNDO_ENABLED: &str = "UndoEnabled";
/// Caption template for newly created nodes.
pub const KEY_CAPTION_SPEC: &str = "CaptionSpec";

pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// Options controlling history and defaults of one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    pub undo_enabled: bool,
    pub undo_limit: usize,
    pub default_caption_spec: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            undo_enabled: true,
            undo_limit: DEFAULT_UNDO_LIMIT,
            default_caption_spec: DEFAULT_CAPTION_SPEC.to_string(),
        }
    }
}

impl TreeConfig {
    /// Reads the `Project` group, falling back to compiled-in defaults.
    pub fn from_settings<R: SettingsRepository>(
        settings: &SettingsService<R>,
    ) -> SettingsResult<Self> {
        Ok(Self {
            undo_enabled: settings.bool_value(PROJECT_GROUP, KEY_UNDO_ENABLED)?,
            undo_limit: settings.usize_value(PROJECT_GROUP, KEY_UNDO_LIMIT)?,
            default_caption_spec: settings.string_value(PROJECT_GROUP, KEY_CAPTION_SPEC)?,
        })
    }
}
