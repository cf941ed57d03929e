//! Arena storage for the ownership tree.
//!
//! # Responsibility
//! - Own every node of one tree in a slot arena addressed by generational
//!   handles.
//! - Keep parent/child linkage and the explicit lifecycle tag consistent.
//!
//! # Invariants
//! - A node is `Attached` to at most one parent, and appears exactly once in
//!   that parent's child list.
//! - Child lists are ordered; order is only changed by `link`/`unlink`.
//! - A destroyed slot bumps its generation, so stale handles never resolve.
//! - Only unattached nodes (`Root` or `HeldByCommand`) can be linked or
//!   destroyed.

use crate::model::kind::{ChildFilter, NodeKind};
use crate::model::node::Node;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Generational handle of one node inside a tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Who keeps a node alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never attached; owned by whoever created it.
    Root,
    /// Child of the given parent.
    Attached(NodeId),
    /// Detached by a command that may re-attach it on undo or redo.
    HeldByCommand,
}

/// Result type used by tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors from tree operations. All of them are caller defects and are
/// reported before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Handle does not resolve to a live node.
    NodeNotFound(NodeId),
    /// `child` is not a direct child of `parent`.
    NotAChild { parent: NodeId, child: NodeId },
    /// `child` already has an owner.
    AlreadyOwned { child: NodeId, parent: NodeId },
    /// Inserting `node` under `parent` would make it its own ancestor.
    CycleDetected { node: NodeId, parent: NodeId },
    /// Node has no parent but the operation needs one.
    NoParent(NodeId),
    /// Explicit insertion index beyond the end of the child list.
    IndexOutOfRange {
        parent: NodeId,
        index: usize,
        len: usize,
    },
    /// Node is still attached and cannot be destroyed.
    StillAttached(NodeId),
    /// The project root cannot be detached or destroyed.
    ProjectRoot(NodeId),
    /// `end_macro` without a matching `begin_macro`.
    NoOpenMacro,
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "tree node not found: {id}"),
            Self::NotAChild { parent, child } => {
                write!(f, "node {child} is not a child of {parent}")
            }
            Self::AlreadyOwned { child, parent } => {
                write!(f, "node {child} is already owned by {parent}")
            }
            Self::CycleDetected { node, parent } => write!(
                f,
                "move would create cycle: node {node} under parent {parent}"
            ),
            Self::NoParent(id) => write!(f, "node {id} has no parent"),
            Self::IndexOutOfRange { parent, index, len } => write!(
                f,
                "child index {index} out of range for {parent} with {len} children"
            ),
            Self::StillAttached(id) => write!(f, "node {id} is still attached"),
            Self::ProjectRoot(id) => write!(f, "node {id} is the project root"),
            Self::NoOpenMacro => write!(f, "no macro is being recorded"),
        }
    }
}

impl Error for TreeError {}

#[derive(Debug)]
struct Entry {
    node: Node,
    lifecycle: Lifecycle,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Slot arena holding all nodes of one tree.
#[derive(Debug, Default)]
pub struct TreeStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a free-floating node and returns its handle.
    pub fn create(&mut self, node: Node) -> NodeId {
        let entry = Entry {
            node,
            lifecycle: Lifecycle::Root,
            children: Vec::new(),
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_ok()
    }

    pub fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.entry(id).map(|entry| &entry.node)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.entry_mut(id).map(|entry| &mut entry.node)
    }

    pub fn lifecycle(&self, id: NodeId) -> TreeResult<Lifecycle> {
        self.entry(id).map(|entry| entry.lifecycle)
    }

    /// Parent handle, `None` for unattached nodes and unknown handles.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match self.entry(id).ok()?.lifecycle {
            Lifecycle::Attached(parent) => Some(parent),
            Lifecycle::Root | Lifecycle::HeldByCommand => None,
        }
    }

    /// All children in order, hidden ones included.
    pub fn children(&self, id: NodeId) -> TreeResult<&[NodeId]> {
        self.entry(id).map(|entry| entry.children.as_slice())
    }

    /// Position of `child` in `parent`'s full child list.
    pub fn position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.entry(parent)
            .ok()?
            .children
            .iter()
            .position(|id| *id == child)
    }

    /// Children narrowed by `filter`, in sibling order (pre-order when
    /// recursive).
    pub fn filtered_children(&self, id: NodeId, filter: ChildFilter) -> TreeResult<Vec<NodeId>> {
        self.children_where(id, filter, |_| true)
    }

    /// Like [`Self::filtered_children`] with an additional predicate.
    pub fn children_where(
        &self,
        id: NodeId,
        filter: ChildFilter,
        predicate: impl Fn(&Node) -> bool,
    ) -> TreeResult<Vec<NodeId>> {
        let mut result = Vec::new();
        self.collect_children(id, filter, &predicate, &mut result)?;
        Ok(result)
    }

    fn collect_children(
        &self,
        id: NodeId,
        filter: ChildFilter,
        predicate: &dyn Fn(&Node) -> bool,
        out: &mut Vec<NodeId>,
    ) -> TreeResult<()> {
        for child in self.children(id)? {
            let node = self.node(*child)?;
            if !filter.include_hidden && node.is_hidden() {
                continue;
            }
            if node.inherits(filter.kind) && predicate(node) {
                out.push(*child);
            }
            if filter.recursive {
                self.collect_children(*child, filter, predicate, out)?;
            }
        }
        Ok(())
    }

    /// Index of `child` among the children of `parent` counted by `filter`.
    ///
    /// The filter's `recursive` flag is ignored. A hidden child that is
    /// excluded by the filter still reports the position it would occupy.
    pub fn index_of_child(&self, parent: NodeId, child: NodeId, filter: ChildFilter) -> Option<usize> {
        let mut index = 0;
        for id in self.children(parent).ok()? {
            if *id == child {
                return Some(index);
            }
            let node = self.node(*id).ok()?;
            if node.inherits(filter.kind) && (filter.include_hidden || !node.is_hidden()) {
                index += 1;
            }
        }
        None
    }

    /// Number of direct children counted by `filter` (`recursive` ignored).
    pub fn child_count(&self, parent: NodeId, filter: ChildFilter) -> usize {
        self.filtered_children(parent, ChildFilter {
            recursive: false,
            ..filter
        })
        .map_or(0, |children| children.len())
    }

    /// Child at `index` among the children counted by `filter`.
    pub fn child_at(&self, parent: NodeId, index: usize, filter: ChildFilter) -> Option<NodeId> {
        self.filtered_children(parent, ChildFilter {
            recursive: false,
            ..filter
        })
        .ok()?
        .get(index)
        .copied()
    }

    /// First direct child with the given name, hidden children included.
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .ok()?
            .iter()
            .copied()
            .find(|id| self.node(*id).is_ok_and(|node| node.name() == name))
    }

    /// Names of all direct children, hidden ones included.
    pub fn child_names(&self, parent: NodeId) -> TreeResult<Vec<&str>> {
        self.children(parent)?
            .iter()
            .map(|id| self.node(*id).map(Node::name))
            .collect()
    }

    /// Iterates from the parent of `id` up to the top-most ancestor.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Whether `ancestor` is a proper ancestor of `id`.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|current| current == ancestor)
    }

    /// Top-most ancestor of `id`, or `id` itself when unattached.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().unwrap_or(id)
    }

    /// Closest ancestor inheriting from `kind`.
    pub fn ancestor_of_kind(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.ancestors(id)
            .find(|current| self.node(*current).is_ok_and(|node| node.inherits(kind)))
    }

    /// Whether the node and all of its ancestors are visible.
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .all(|current| self.node(current).is_ok_and(|node| !node.is_hidden()))
    }

    /// `/`-joined names from the top-most ancestor down to `id`.
    pub fn path(&self, id: NodeId) -> TreeResult<String> {
        let mut names = vec![self.node(id)?.name()];
        for ancestor in self.ancestors(id) {
            names.push(self.node(ancestor)?.name());
        }
        names.reverse();
        Ok(names.join("/"))
    }

    /// Inserts unattached `child` into `parent` at `index`.
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId, index: usize) -> TreeResult<()> {
        self.check_linkable(parent, child)?;
        let len = self.children(parent)?.len();
        if index > len {
            return Err(TreeError::IndexOutOfRange { parent, index, len });
        }
        self.entry_mut(parent)?.children.insert(index, child);
        self.entry_mut(child)?.lifecycle = Lifecycle::Attached(parent);
        Ok(())
    }

    /// Checks every precondition of [`Self::link`] without mutating.
    pub(crate) fn check_linkable(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.entry(parent)?;
        if let Lifecycle::Attached(owner) = self.lifecycle(child)? {
            return Err(TreeError::AlreadyOwned {
                child,
                parent: owner,
            });
        }
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(TreeError::CycleDetected {
                node: child,
                parent,
            });
        }
        Ok(())
    }

    /// Detaches `child` from `parent`; the command performing it holds the
    /// node afterwards. Returns the former position.
    pub(crate) fn unlink(&mut self, parent: NodeId, child: NodeId) -> TreeResult<usize> {
        let index = self
            .position(parent, child)
            .ok_or(TreeError::NotAChild { parent, child })?;
        self.entry_mut(parent)?.children.remove(index);
        self.entry_mut(child)?.lifecycle = Lifecycle::HeldByCommand;
        Ok(index)
    }

    /// Destroys an unattached node together with its subtree. Returns the
    /// destroyed handles, `id` first.
    pub(crate) fn destroy(&mut self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        if let Lifecycle::Attached(_) = self.lifecycle(id)? {
            return Err(TreeError::StillAttached(id));
        }
        let mut destroyed = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current.index as usize];
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                self.live -= 1;
                pending.extend(entry.children.into_iter().rev());
                destroyed.push(current);
            }
        }
        Ok(destroyed)
    }

    fn entry(&self, id: NodeId) -> TreeResult<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(TreeError::NodeNotFound(id))
    }

    fn entry_mut(&mut self, id: NodeId) -> TreeResult<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(TreeError::NodeNotFound(id))
    }
}
