//! Node <-> element conversion and project save/load.
//!
//! # Responsibility
//! - Write a subtree as nested elements.
//! - Read elements back into detached node templates, collecting
//!   human-readable warnings for recoverable problems.
//! - Offer save/load/import entry points on [`AspectTree`].
//!
//! # Invariants
//! - Loading never records history; a freshly loaded tree has no undo
//!   entries and is unchanged.
//! - Importing into an existing tree is one undoable insertion.
//! - A missing name or creation time degrades to a fallback with a warning
//!   instead of failing the document.
//! - Duplicate sibling names are kept as stored but reported; a repeated
//!   uuid is replaced by a fresh one and reported.

use super::{
    escape_comment, unescape_comment, Element, ProjectDocument, SerializeError, SerializeResult,
    ATTR_CAPTION_SPEC, ATTR_CREATION_TIME, ATTR_HIDDEN, ATTR_NAME, ATTR_UUID, COMMENT_TAG,
    CREATION_TIME_FORMAT,
};
use crate::config::TreeConfig;
use crate::model::kind::NodeKind;
use crate::model::node::Node;
use crate::repo::tree_repo::{NodeId, TreeResult, TreeStore};
use crate::service::tree_service::AspectTree;
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Detached node description produced by [`ElementReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTemplate {
    pub node: Node,
    pub children: Vec<NodeTemplate>,
}

impl NodeTemplate {
    /// Number of nodes in this template, itself included.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NodeTemplate::node_count)
            .sum::<usize>()
    }
}

/// Result of [`AspectTree::load_from_str`].
pub struct LoadedProject {
    pub tree: AspectTree,
    pub warnings: Vec<String>,
}

/// Result of [`AspectTree::import_element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedSubtree {
    pub node: NodeId,
    pub warnings: Vec<String>,
}

/// Writes `id` and its whole subtree, hidden children included.
pub fn write_element(store: &TreeStore, id: NodeId) -> TreeResult<Element> {
    let node = store.node(id)?;
    let tag = node
        .kind()
        .capabilities()
        .element_tag
        .unwrap_or_else(|| node.kind().type_name());
    let mut element = Element::new(tag)
        .with_attribute(ATTR_NAME, node.name())
        .with_attribute(
            ATTR_CREATION_TIME,
            node.creation_time().format(CREATION_TIME_FORMAT).to_string(),
        )
        .with_attribute(ATTR_CAPTION_SPEC, node.caption_spec())
        .with_attribute(ATTR_UUID, node.uuid().to_string());
    if node.is_hidden() {
        element = element.with_attribute(ATTR_HIDDEN, "1");
    }
    if !node.comment().is_empty() {
        element
            .children
            .push(Element::new(COMMENT_TAG).with_text(escape_comment(node.comment())));
    }
    for child in store.children(id)? {
        element.children.push(write_element(store, *child)?);
    }
    Ok(element)
}

/// Element-to-template reader accumulating warnings.
#[derive(Debug, Default)]
pub struct ElementReader {
    warnings: Vec<String>,
    fresh_identities: bool,
    seen_uuids: HashSet<Uuid>,
}

impl ElementReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignores stored uuids so read nodes can coexist with their originals.
    pub fn with_fresh_identities(mut self) -> Self {
        self.fresh_identities = true;
        self
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    pub fn raise_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Reads `element` as a node subtree.
    ///
    /// # Errors
    /// - [`SerializeError::UnknownRootElement`] when the tag of `element`
    ///   itself is not a concrete node kind. Unknown nested elements only
    ///   produce warnings.
    pub fn read_node(&mut self, element: &Element) -> SerializeResult<NodeTemplate> {
        match concrete_kind(&element.tag) {
            Some(kind) => Ok(self.read_known(kind, element)),
            None => Err(SerializeError::UnknownRootElement(element.tag.clone())),
        }
    }

    fn read_known(&mut self, kind: NodeKind, element: &Element) -> NodeTemplate {
        let name = match element.attribute(ATTR_NAME) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                self.raise_warning("Attribute 'name' is missing or empty.");
                String::new()
            }
        };
        let stored = element
            .attribute(ATTR_UUID)
            .filter(|_| !self.fresh_identities)
            .and_then(|value| Uuid::parse_str(value).ok());
        let uuid = match stored {
            Some(uuid) if self.seen_uuids.insert(uuid) => uuid,
            Some(_) => {
                self.raise_warning(format!(
                    "Duplicate uuid for '{name}'. Assigning a new one."
                ));
                Uuid::new_v4()
            }
            None => Uuid::new_v4(),
        };
        let mut node = Node::with_uuid(uuid, kind, name)
            .with_creation_time(self.read_creation_time(element));

        if let Some(spec) = element.attribute(ATTR_CAPTION_SPEC) {
            node = node.with_caption_spec(spec);
        }
        match element.attribute(ATTR_HIDDEN) {
            None | Some("0") => {}
            Some("1") => node = node.with_hidden(true),
            Some(other) => self.raise_warning(format!(
                "Invalid value '{other}' of attribute 'hidden' for '{}'.",
                node.name()
            )),
        }

        let mut children: Vec<NodeTemplate> = Vec::new();
        let mut sibling_names = HashSet::new();
        for child in &element.children {
            if child.tag == COMMENT_TAG {
                node = node.with_comment(unescape_comment(child.text.as_deref().unwrap_or("")));
                continue;
            }
            match concrete_kind(&child.tag) {
                Some(child_kind) => {
                    let template = self.read_known(child_kind, child);
                    if !sibling_names.insert(template.node.name().to_string()) {
                        self.raise_warning(format!(
                            "Duplicate name '{}' among the children of '{}'.",
                            template.node.name(),
                            node.name()
                        ));
                    }
                    children.push(template);
                }
                None => self.raise_warning(format!("Unknown element '{}' skipped.", child.tag)),
            }
        }
        NodeTemplate { node, children }
    }

    fn read_creation_time(&mut self, element: &Element) -> NaiveDateTime {
        let name = element.attribute(ATTR_NAME).unwrap_or_default();
        let parsed = element
            .attribute(ATTR_CREATION_TIME)
            .filter(|value| !value.is_empty())
            .map(|value| NaiveDateTime::parse_from_str(value, CREATION_TIME_FORMAT));
        match parsed {
            Some(Ok(time)) => time,
            Some(Err(_)) | None => {
                self.raise_warning(format!(
                    "Invalid creation time for '{name}'. Using current time."
                ));
                Local::now().naive_local()
            }
        }
    }
}

fn concrete_kind(tag: &str) -> Option<NodeKind> {
    NodeKind::from_element_tag(tag).filter(|kind| kind.is_concrete())
}

impl AspectTree {
    /// Element tree of `node` and its descendants.
    pub fn export_subtree(&self, node: NodeId) -> TreeResult<Element> {
        write_element(self.store(), node)
    }

    /// Whole project as a document string.
    pub fn save_to_string(&self) -> SerializeResult<String> {
        let root = self.export_subtree(self.project_root())?;
        ProjectDocument::new(root).to_json()
    }

    /// Writes the project to `path` and clears the unsaved-changes flag.
    pub fn save(&mut self, path: impl AsRef<Path>) -> SerializeResult<()> {
        let path = path.as_ref();
        let started_at = Instant::now();
        let text = self.save_to_string()?;
        std::fs::write(path, text).map_err(|err| {
            error!("event=project_save module=serialize status=error error={}", err);
            SerializeError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        self.mark_saved();
        info!(
            "event=project_save module=serialize status=ok nodes={} duration_ms={}",
            self.store().len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Builds a new tree from a document string.
    pub fn load_from_str(text: &str, config: TreeConfig) -> SerializeResult<LoadedProject> {
        let document = ProjectDocument::from_json(text)?;
        let mut reader = ElementReader::new();
        let template = reader.read_node(&document.root)?;
        let node_count = template.node_count();

        let mut tree = AspectTree::with_config(template.node, config);
        let project = tree.project_root();
        tree.graft_children(project, template.children)?;

        let warnings = reader.into_warnings();
        if !warnings.is_empty() {
            warn!(
                "event=project_load module=serialize status=warning warnings={}",
                warnings.len()
            );
        }
        info!(
            "event=project_load module=serialize status=ok nodes={}",
            node_count
        );
        Ok(LoadedProject { tree, warnings })
    }

    /// Reads a project file.
    pub fn load(path: impl AsRef<Path>, config: TreeConfig) -> SerializeResult<LoadedProject> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| SerializeError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::load_from_str(&text, config)
    }

    /// Reads `element` as a subtree and appends it to `parent` as one
    /// undoable step, renaming the subtree root on a name collision.
    ///
    /// Imported nodes get fresh uuids.
    pub fn import_element(
        &mut self,
        parent: NodeId,
        element: &Element,
    ) -> SerializeResult<ImportedSubtree> {
        self.node(parent)?;
        let mut reader = ElementReader::new().with_fresh_identities();
        let template = reader.read_node(element)?;

        let node = self.create_from(template.node);
        if let Err(err) = self
            .graft_children(node, template.children)
            .and_then(|()| self.add_child(parent, node))
        {
            if let Err(discard_err) = self.discard(node) {
                warn!(
                    "event=subtree_import module=serialize status=error node={} error={}",
                    node, discard_err
                );
            }
            return Err(err.into());
        }
        Ok(ImportedSubtree {
            node,
            warnings: reader.into_warnings(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{write_element, ElementReader};
    use crate::model::kind::NodeKind;
    use crate::serialize::{Element, SerializeError, ATTR_CREATION_TIME, ATTR_NAME};
    use crate::service::tree_service::AspectTree;
    use crate::model::node::Node;

    #[test]
    fn missing_name_and_time_produce_warnings() {
        let mut reader = ElementReader::new();
        let template = reader.read_node(&Element::new("folder")).unwrap();
        assert_eq!(template.node.name(), "1");
        assert_eq!(reader.warnings().len(), 2);
        assert!(reader.warnings()[0].contains("'name'"));
        assert!(reader.warnings()[1].contains("creation time"));
    }

    #[test]
    fn unknown_children_are_skipped_with_warning() {
        let element = Element::new("spreadsheet")
            .with_attribute(ATTR_NAME, "Data")
            .with_attribute(ATTR_CREATION_TIME, "2024-31-12 23:59:58:125");
        let mut element = element;
        element.children.push(Element::new("plotArea"));
        element
            .children
            .push(Element::new("column").with_attribute(ATTR_NAME, "x"));

        let mut reader = ElementReader::new();
        let template = reader.read_node(&element).unwrap();
        assert_eq!(template.children.len(), 1);
        assert_eq!(
            template.node.creation_time().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            "2024-12-31 23:59:58.125"
        );
        assert!(reader
            .warnings()
            .iter()
            .any(|warning| warning == "Unknown element 'plotArea' skipped."));
    }

    #[test]
    fn abstract_or_unknown_root_is_an_error() {
        let mut reader = ElementReader::new();
        assert!(matches!(
            reader.read_node(&Element::new("AbstractColumn")),
            Err(SerializeError::UnknownRootElement(_))
        ));
    }

    #[test]
    fn write_element_includes_hidden_children_and_comment() {
        let mut tree = AspectTree::new(Node::new(NodeKind::Project, "Project"));
        let project = tree.project_root();
        let sheet = tree.create_from(
            Node::new(NodeKind::Spreadsheet, "Sheet").with_comment("two\nlines"),
        );
        tree.add_child(project, sheet).unwrap();
        let column = tree.create_node(NodeKind::Column, "x");
        tree.add_child(sheet, column).unwrap();
        tree.set_hidden(column, true).unwrap();

        let element = write_element(tree.store(), sheet).unwrap();
        assert_eq!(element.tag, "spreadsheet");
        assert_eq!(element.children[0].tag, "comment");
        assert_eq!(element.children[0].text.as_deref(), Some("two\\nlines"));
        assert_eq!(element.children[1].attribute("hidden"), Some("1"));
    }
}
