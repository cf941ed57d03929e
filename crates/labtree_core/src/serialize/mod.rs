//! Project document format.
//!
//! # Responsibility
//! - Define the element tree a project is persisted as.
//! - Own the document envelope, its version and the text escaping rules.
//!
//! # Invariants
//! - Each node maps to one element tagged with its kind's element tag.
//! - Comments travel in a dedicated `comment` child element, escaped so
//!   that the stored text never contains a raw line break.
//! - Documents with an unknown `format_version` are rejected as a whole.

pub mod node_io;

use crate::repo::tree_repo::TreeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub use node_io::{ElementReader, NodeTemplate};

/// Document format revision written by this crate.
pub const FORMAT_VERSION: u32 = 1;
/// `creation_time` attribute layout (day before month).
pub const CREATION_TIME_FORMAT: &str = "%Y-%d-%m %H:%M:%S:%3f";
/// Tag of the element carrying a node's comment.
pub const COMMENT_TAG: &str = "comment";

pub const ATTR_NAME: &str = "name";
pub const ATTR_CREATION_TIME: &str = "creation_time";
pub const ATTR_CAPTION_SPEC: &str = "caption_spec";
pub const ATTR_UUID: &str = "uuid";
pub const ATTR_HIDDEN: &str = "hidden";

pub type SerializeResult<T> = Result<T, SerializeError>;

/// Errors that abort a save or load.
#[derive(Debug)]
pub enum SerializeError {
    /// Document text is not valid JSON or does not match the envelope.
    Json(serde_json::Error),
    /// Reading or writing the document file failed.
    Io { path: PathBuf, message: String },
    UnsupportedVersion(u32),
    /// Root element does not name a concrete node kind.
    UnknownRootElement(String),
    /// Tree-level failure while building or attaching loaded nodes.
    Tree(TreeError),
}

impl Display for SerializeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "malformed project document: {err}"),
            Self::Io { path, message } => {
                write!(f, "cannot access `{}`: {message}", path.display())
            }
            Self::UnsupportedVersion(version) => write!(
                f,
                "unsupported document version {version}; expected {FORMAT_VERSION}"
            ),
            Self::UnknownRootElement(tag) => write!(f, "unknown root element `{tag}`"),
            Self::Tree(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SerializeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Tree(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SerializeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<TreeError> for SerializeError {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}

/// One element of the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Versioned document envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub format_version: u32,
    pub root: Element,
}

impl ProjectDocument {
    pub fn new(root: Element) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            root,
        }
    }

    pub fn to_json(&self) -> SerializeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and version-checks a document.
    pub fn from_json(text: &str) -> SerializeResult<Self> {
        let document: Self = serde_json::from_str(text)?;
        if document.format_version != FORMAT_VERSION {
            return Err(SerializeError::UnsupportedVersion(document.format_version));
        }
        Ok(document)
    }
}

/// Escapes `\` as `\\` and line feeds as `\n`.
pub fn escape_comment(comment: &str) -> String {
    let mut escaped = String::with_capacity(comment.len());
    for ch in comment.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Inverse of [`escape_comment`]. Unknown escapes are kept verbatim.
pub fn unescape_comment(stored: &str) -> String {
    let mut comment = String::with_capacity(stored.len());
    let mut chars = stored.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            comment.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => comment.push('\n'),
            Some('\\') => comment.push('\\'),
            Some(other) => {
                comment.push('\\');
                comment.push(other);
            }
            None => comment.push('\\'),
        }
    }
    comment
}
