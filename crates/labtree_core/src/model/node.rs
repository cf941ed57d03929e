//! Node domain model.
//!
//! # Responsibility
//! - Hold the description attributes shared by every node kind.
//! - Render the caption template for views and tooltips.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another node.
//! - `name` is never empty; an empty name is stored as `"1"`.
//! - Description fields change only through tree commands once the node is
//!   owned by a tree, so every change is undoable and observable.

use crate::model::caption::render_caption;
use crate::model::kind::NodeKind;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier carried through save/load.
pub type NodeUuid = Uuid;

/// Caption used when none is specified: name, then ` - comment` if any.
pub const DEFAULT_CAPTION_SPEC: &str = "%n%C{ - }%c";

/// Name substituted for an empty name.
pub const FALLBACK_NAME: &str = "1";

/// Description field changed by a property command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionField {
    Name,
    Comment,
    CaptionSpec,
}

/// One entity of the ownership tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    uuid: NodeUuid,
    kind: NodeKind,
    name: String,
    comment: String,
    caption_spec: String,
    creation_time: NaiveDateTime,
    hidden: bool,
}

impl Node {
    /// Creates a visible node with a fresh uuid and the current local time.
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self::with_uuid(Uuid::new_v4(), kind, name)
    }

    /// Creates a node with a caller-provided uuid.
    ///
    /// Used by load paths where the identity already exists.
    pub fn with_uuid(uuid: NodeUuid, kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            uuid,
            kind,
            name: normalize_name(name.into()),
            comment: String::new(),
            caption_spec: DEFAULT_CAPTION_SPEC.to_string(),
            creation_time: Local::now().naive_local(),
            hidden: false,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_caption_spec(mut self, caption_spec: impl Into<String>) -> Self {
        self.caption_spec = caption_spec.into();
        self
    }

    pub fn with_creation_time(mut self, creation_time: NaiveDateTime) -> Self {
        self.creation_time = creation_time;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn uuid(&self) -> NodeUuid {
        self.uuid
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn caption_spec(&self) -> &str {
        &self.caption_spec
    }

    pub fn creation_time(&self) -> NaiveDateTime {
        self.creation_time
    }

    /// Whether this node is excluded from default enumeration and projection.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Shorthand for `kind().inherits(base)`.
    pub fn inherits(&self, base: NodeKind) -> bool {
        self.kind.inherits(base)
    }

    /// Renders `caption_spec` against the current description.
    pub fn caption(&self) -> String {
        render_caption(
            &self.caption_spec,
            &self.name,
            &self.comment,
            self.creation_time,
        )
    }

    pub fn description(&self, field: DescriptionField) -> &str {
        match field {
            DescriptionField::Name => &self.name,
            DescriptionField::Comment => &self.comment,
            DescriptionField::CaptionSpec => &self.caption_spec,
        }
    }

    /// Swaps one description field with `value`, leaving the old value in it.
    pub(crate) fn swap_description(&mut self, field: DescriptionField, value: &mut String) {
        let slot = match field {
            DescriptionField::Name => &mut self.name,
            DescriptionField::Comment => &mut self.comment,
            DescriptionField::CaptionSpec => &mut self.caption_spec,
        };
        std::mem::swap(slot, value);
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub(crate) fn set_creation_time(&mut self, creation_time: NaiveDateTime) {
        self.creation_time = creation_time;
    }
}

/// Maps an empty name to [`FALLBACK_NAME`].
pub fn normalize_name(name: String) -> String {
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}
