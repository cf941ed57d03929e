//! Row/column read model over a subtree.
//!
//! # Responsibility
//! - Address visible nodes as `(row, column, parent)` indexes with the
//!   columns Name, Type, Created and Comment.
//! - Translate tree notifications into bracketed row insert/remove events
//!   and data-changed events for view consumers.
//! - Route Name and Comment edits back through the undoable tree API.
//!
//! # Invariants
//! - The invisible top level has exactly one row: the projection root.
//! - The row of a node is its position among its visible siblings and is
//!   always computed from the current tree, never cached.
//! - Every structural change is delivered inside a begin/end bracket; nodes
//!   that are not shown (hidden themselves or below a hidden ancestor)
//!   produce no bracket at all.
//! - The projection never mutates the tree except through [`AspectTree`].

use crate::model::kind::{ChildFilter, NodeKind};
use crate::model::naming::NameHandling;
use crate::notify::{SubscriptionId, TreeEvent, TreeObserver};
use crate::repo::tree_repo::{NodeId, TreeResult, TreeStore};
use crate::service::tree_service::AspectTree;
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;

pub const COLUMN_COUNT: usize = 4;
const HEADERS: [&str; COLUMN_COUNT] = ["Name", "Type", "Created", "Comment"];
/// Creation time as shown in the `Created` column.
pub const CREATED_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Projection column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Type,
    Created,
    Comment,
}

impl Column {
    pub fn from_index(column: usize) -> Option<Self> {
        match column {
            0 => Some(Self::Name),
            1 => Some(Self::Type),
            2 => Some(Self::Created),
            3 => Some(Self::Comment),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Name => 0,
            Self::Type => 1,
            Self::Created => 2,
            Self::Comment => 3,
        }
    }
}

/// Kind of data requested from [`TreeProjection::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    Display,
    Edit,
    ToolTip,
    /// Icon theme name, column 0 only.
    Decoration,
}

/// Position of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelIndex {
    pub row: usize,
    pub column: usize,
    pub node: NodeId,
}

/// Interaction flags of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFlags {
    pub enabled: bool,
    pub selectable: bool,
    pub editable: bool,
    pub drag_enabled: bool,
    pub drop_enabled: bool,
}

/// Change notification for view consumers.
///
/// `parent: None` denotes the invisible top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionEvent {
    BeginInsertRows {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    EndInsertRows {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    BeginRemoveRows {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    EndRemoveRows {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    DataChanged {
        top_left: ModelIndex,
        bottom_right: ModelIndex,
    },
    StatusInfo(String),
    RenameRequested(ModelIndex),
}

/// Name filter; a node matches when it or any ancestor matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    pub pattern: String,
    pub case_sensitive: bool,
    /// Compare whole names instead of substrings.
    pub whole_word: bool,
}

impl NameFilter {
    fn matches_name(&self, name: &str) -> bool {
        match (self.case_sensitive, self.whole_word) {
            (true, true) => name == self.pattern,
            (true, false) => name.contains(&self.pattern),
            (false, true) => name.to_lowercase() == self.pattern.to_lowercase(),
            (false, false) => name
                .to_lowercase()
                .contains(&self.pattern.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BracketKind {
    Insert,
    Remove,
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    kind: BracketKind,
    parent: Option<ModelIndex>,
    row: usize,
}

#[derive(Debug, Default)]
struct ProjectionState {
    events: Vec<ProjectionEvent>,
    open_brackets: Vec<Option<Bracket>>,
    read_only: bool,
    selectable_kinds: Vec<NodeKind>,
    filter: Option<NameFilter>,
    subscription: Option<SubscriptionId>,
}

/// Row/column projection of the subtree under `root`.
#[derive(Debug)]
pub struct TreeProjection {
    root: NodeId,
    state: RefCell<ProjectionState>,
}

impl TreeProjection {
    /// Creates a projection of `root` and subscribes it to `tree`.
    pub fn attach(tree: &mut AspectTree, root: NodeId) -> TreeResult<Rc<Self>> {
        tree.node(root)?;
        let projection = Rc::new(Self {
            root,
            state: RefCell::new(ProjectionState::default()),
        });
        let subscription = tree.subscribe(root, projection.clone());
        projection.state.borrow_mut().subscription = Some(subscription);
        debug!("event=projection_attach module=projection status=ok root={}", root);
        Ok(projection)
    }

    /// Stops listening to `tree`.
    pub fn detach(&self, tree: &mut AspectTree) {
        if let Some(subscription) = self.state.borrow_mut().subscription.take() {
            tree.unsubscribe(subscription);
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns and clears the pending consumer events.
    pub fn drain_events(&self) -> Vec<ProjectionEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state.borrow_mut().read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.state.borrow().read_only
    }

    /// Restricts selection to nodes inheriting one of `kinds`; empty allows
    /// every kind.
    pub fn set_selectable_kinds(&self, kinds: Vec<NodeKind>) {
        self.state.borrow_mut().selectable_kinds = kinds;
    }

    pub fn selectable_kinds(&self) -> Vec<NodeKind> {
        self.state.borrow().selectable_kinds.clone()
    }

    /// Installs or clears the name filter and announces a data change over
    /// the top level.
    pub fn set_filter(&self, store: &TreeStore, filter: Option<NameFilter>) {
        let filter = filter.filter(|filter| !filter.pattern.is_empty());
        let mut state = self.state.borrow_mut();
        state.filter = filter;
        if let Some((top_left, bottom_right)) = self.row_span(store, self.root) {
            state.events.push(ProjectionEvent::DataChanged {
                top_left,
                bottom_right,
            });
        }
    }

    pub fn filter(&self) -> Option<NameFilter> {
        self.state.borrow().filter.clone()
    }

    pub fn column_count(&self) -> usize {
        COLUMN_COUNT
    }

    pub fn header_data(&self, section: usize) -> Option<&'static str> {
        HEADERS.get(section).copied()
    }

    /// Number of rows below `parent`; `None` is the top level.
    pub fn row_count(&self, store: &TreeStore, parent: Option<&ModelIndex>) -> usize {
        match parent {
            None => 1,
            Some(parent) => store.child_count(parent.node, ChildFilter::visible()),
        }
    }

    /// Index of the cell at `row`/`column` below `parent`.
    pub fn index(
        &self,
        store: &TreeStore,
        row: usize,
        column: usize,
        parent: Option<&ModelIndex>,
    ) -> Option<ModelIndex> {
        if column >= COLUMN_COUNT {
            return None;
        }
        let node = match parent {
            None if row == 0 => self.root,
            None => return None,
            Some(parent) => store.child_at(parent.node, row, ChildFilter::visible())?,
        };
        Some(ModelIndex { row, column, node })
    }

    /// Parent index of `index`, `None` for the projection root.
    pub fn parent(&self, store: &TreeStore, index: &ModelIndex) -> Option<ModelIndex> {
        if index.node == self.root {
            return None;
        }
        let parent = store.parent(index.node)?;
        self.index_of_node(store, parent, 0)
    }

    /// Index of `node` in `column`, `None` when it is not shown.
    pub fn index_of_node(&self, store: &TreeStore, node: NodeId, column: usize) -> Option<ModelIndex> {
        if column >= COLUMN_COUNT || !self.is_shown(store, node) {
            return None;
        }
        let row = self.row_of(store, node)?;
        Some(ModelIndex { row, column, node })
    }

    /// Index of the node addressed by a `/`-joined name path starting with
    /// the root's name.
    pub fn index_of_path(&self, store: &TreeStore, path: &str, column: usize) -> Option<ModelIndex> {
        let mut parts = path.split('/');
        let root_name = store.node(self.root).ok()?.name();
        if parts.next()? != root_name {
            return None;
        }
        let mut current = self.root;
        for part in parts {
            current = store
                .filtered_children(current, ChildFilter::visible())
                .ok()?
                .into_iter()
                .find(|child| store.node(*child).is_ok_and(|node| node.name() == part))?;
        }
        self.index_of_node(store, current, column)
    }

    /// Cell content for `role`.
    pub fn data(&self, store: &TreeStore, index: &ModelIndex, role: ItemRole) -> Option<String> {
        let node = store.node(index.node).ok()?;
        let column = Column::from_index(index.column)?;
        match role {
            ItemRole::Display | ItemRole::Edit => Some(match column {
                Column::Name => node.name().to_string(),
                Column::Type => node.kind().capabilities().type_label.to_string(),
                Column::Created => node
                    .creation_time()
                    .format(CREATED_DISPLAY_FORMAT)
                    .to_string(),
                Column::Comment => simplified(&node.comment().replace('\n', " ")),
            }),
            ItemRole::ToolTip => {
                let mut tooltip = format!("<b>{}</b>", node.name());
                if !node.comment().is_empty() {
                    tooltip.push_str("<br><br>");
                    tooltip.push_str(&node.comment().replace('\n', "<br>"));
                }
                Some(tooltip)
            }
            ItemRole::Decoration => (column == Column::Name)
                .then(|| node.kind().capabilities().icon.to_string()),
        }
    }

    /// Interaction flags of `index`.
    pub fn flags(&self, store: &TreeStore, index: &ModelIndex) -> ItemFlags {
        let Ok(node) = store.node(index.node) else {
            return ItemFlags::default();
        };
        let state = self.state.borrow();
        let passes_filter = index.node == self.root
            || state
                .filter
                .as_ref()
                .map_or(true, |filter| self.matches_filter(store, index.node, filter));

        let mut flags = ItemFlags::default();
        if state.selectable_kinds.is_empty() {
            flags.selectable = true;
            flags.enabled = passes_filter;
        } else if state
            .selectable_kinds
            .iter()
            .any(|kind| node.inherits(*kind))
        {
            flags.selectable = true;
            flags.enabled = passes_filter;
        }

        if !state.read_only {
            flags.editable = matches!(
                Column::from_index(index.column),
                Some(Column::Name | Column::Comment)
            );
        }
        if node.inherits(NodeKind::AbstractColumn) {
            flags.drag_enabled = true;
            flags.drop_enabled = true;
        }
        flags
    }

    /// Whether `node` or one of its ancestors matches the active filter.
    /// Always `true` without a filter.
    pub fn contains_filter_string(&self, store: &TreeStore, node: NodeId) -> bool {
        match &self.state.borrow().filter {
            None => true,
            Some(filter) => self.matches_filter(store, node, filter),
        }
    }

    /// Applies an edit of the Name or Comment column through `tree`.
    ///
    /// Returns `false` when the cell is not editable or the name is taken;
    /// the latter also queues a status message.
    pub fn set_data(&self, tree: &mut AspectTree, index: &ModelIndex, value: &str) -> TreeResult<bool> {
        if self.is_read_only() {
            return Ok(false);
        }
        match Column::from_index(index.column) {
            Some(Column::Name) => {
                if tree.set_name(index.node, value, NameHandling::UniqueRequired)? {
                    return Ok(true);
                }
                self.state
                    .borrow_mut()
                    .events
                    .push(ProjectionEvent::StatusInfo(format!(
                        "The name \"{value}\" is already in use. Choose another name."
                    )));
                Ok(false)
            }
            Some(Column::Comment) => {
                tree.set_comment(index.node, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn matches_filter(&self, store: &TreeStore, node: NodeId, filter: &NameFilter) -> bool {
        std::iter::once(node)
            .chain(store.ancestors(node))
            .filter_map(|id| store.node(id).ok())
            .any(|current| filter.matches_name(current.name()))
    }

    /// Whether `node` has a row: it is the root, or it lies below the root
    /// with itself and every ancestor up to the root visible.
    fn is_shown(&self, store: &TreeStore, node: NodeId) -> bool {
        if node == self.root {
            return true;
        }
        let mut current = node;
        loop {
            match store.node(current) {
                Ok(visible) if !visible.is_hidden() => {}
                _ => return false,
            }
            match store.parent(current) {
                Some(parent) if parent == self.root => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn row_of(&self, store: &TreeStore, node: NodeId) -> Option<usize> {
        if node == self.root {
            return Some(0);
        }
        let parent = store.parent(node)?;
        store.index_of_child(parent, node, ChildFilter::visible())
    }

    fn row_span(&self, store: &TreeStore, node: NodeId) -> Option<(ModelIndex, ModelIndex)> {
        let top_left = self.index_of_node(store, node, 0)?;
        let bottom_right = ModelIndex {
            column: COLUMN_COUNT - 1,
            ..top_left
        };
        Some((top_left, bottom_right))
    }

    fn open_bracket(&self, bracket: Option<Bracket>) {
        let mut state = self.state.borrow_mut();
        if let Some(bracket) = bracket {
            let event = match bracket.kind {
                BracketKind::Insert => ProjectionEvent::BeginInsertRows {
                    parent: bracket.parent,
                    first: bracket.row,
                    last: bracket.row,
                },
                BracketKind::Remove => ProjectionEvent::BeginRemoveRows {
                    parent: bracket.parent,
                    first: bracket.row,
                    last: bracket.row,
                },
            };
            state.events.push(event);
        }
        state.open_brackets.push(bracket);
    }

    fn close_bracket(&self) {
        let mut state = self.state.borrow_mut();
        let Some(bracket) = state.open_brackets.pop() else {
            warn!("event=projection_bracket module=projection status=error reason=unbalanced");
            return;
        };
        if let Some(bracket) = bracket {
            let event = match bracket.kind {
                BracketKind::Insert => ProjectionEvent::EndInsertRows {
                    parent: bracket.parent,
                    first: bracket.row,
                    last: bracket.row,
                },
                BracketKind::Remove => ProjectionEvent::EndRemoveRows {
                    parent: bracket.parent,
                    first: bracket.row,
                    last: bracket.row,
                },
            };
            state.events.push(event);
        }
    }

    /// Bracket for inserting `child` into `parent` in front of `before`.
    fn insert_bracket(
        &self,
        store: &TreeStore,
        parent: NodeId,
        before: Option<NodeId>,
        child: NodeId,
    ) -> Option<Bracket> {
        if store.node(child).ok()?.is_hidden() || !self.is_shown(store, parent) {
            return None;
        }
        let row = match before {
            Some(before) => store.index_of_child(parent, before, ChildFilter::visible())?,
            None => store.child_count(parent, ChildFilter::visible()),
        };
        Some(Bracket {
            kind: BracketKind::Insert,
            parent: self.index_of_node(store, parent, 0),
            row,
        })
    }

    /// Bracket for removing the currently shown `child` from its parent.
    fn remove_bracket(&self, store: &TreeStore, child: NodeId) -> Option<Bracket> {
        if child == self.root || !self.is_shown(store, child) {
            return None;
        }
        let parent = store.parent(child)?;
        Some(Bracket {
            kind: BracketKind::Remove,
            parent: self.index_of_node(store, parent, 0),
            row: store.index_of_child(parent, child, ChildFilter::visible())?,
        })
    }

    /// Bracket for a visibility flip of `node`: showing it is an insert,
    /// hiding it a remove. Nothing when an ancestor keeps it hidden anyway.
    fn visibility_bracket(&self, store: &TreeStore, node: NodeId) -> Option<Bracket> {
        if node == self.root {
            return None;
        }
        let parent = store.parent(node)?;
        if !self.is_shown(store, parent) {
            return None;
        }
        let row = store.index_of_child(parent, node, ChildFilter::visible())?;
        let kind = if store.node(node).ok()?.is_hidden() {
            BracketKind::Insert
        } else {
            BracketKind::Remove
        };
        Some(Bracket {
            kind,
            parent: self.index_of_node(store, parent, 0),
            row,
        })
    }
}

impl TreeObserver for TreeProjection {
    fn on_tree_event(&self, store: &TreeStore, event: &TreeEvent) {
        match event {
            TreeEvent::ChildAboutToBeAdded {
                parent,
                before,
                child,
            } => self.open_bracket(self.insert_bracket(store, *parent, *before, *child)),
            TreeEvent::ChildAboutToBeRemoved { child } => {
                self.open_bracket(self.remove_bracket(store, *child))
            }
            TreeEvent::HiddenAboutToChange { node } => {
                self.open_bracket(self.visibility_bracket(store, *node))
            }
            TreeEvent::ChildAdded { .. }
            | TreeEvent::ChildRemoved { .. }
            | TreeEvent::HiddenChanged { .. } => self.close_bracket(),
            TreeEvent::DescriptionChanged { node } => {
                if let Some((top_left, bottom_right)) = self.row_span(store, *node) {
                    self.state
                        .borrow_mut()
                        .events
                        .push(ProjectionEvent::DataChanged {
                            top_left,
                            bottom_right,
                        });
                }
            }
            TreeEvent::DescriptionAboutToChange { .. } => {}
            TreeEvent::StatusInfo { message, .. } => self
                .state
                .borrow_mut()
                .events
                .push(ProjectionEvent::StatusInfo(message.clone())),
            TreeEvent::RenameRequested { node } => {
                if let Some(index) = self.index_of_node(store, *node, 0) {
                    self.state
                        .borrow_mut()
                        .events
                        .push(ProjectionEvent::RenameRequested(index));
                }
            }
        }
    }
}

/// Trims and collapses inner whitespace runs to single spaces.
fn simplified(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
