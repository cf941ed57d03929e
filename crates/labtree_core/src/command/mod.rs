//! Reversible tree mutations.
//!
//! # Responsibility
//! - Wrap every tree mutation in a command that can be applied and reverted
//!   any number of times.
//! - Perform the relay subscribe/unsubscribe step together with each
//!   link/unlink, and raise the matching before/after events.
//!
//! # Invariants
//! - State moves `Pending -> Applied <-> Reverted`; applying an applied
//!   command or reverting a non-applied one is a no-op.
//! - Apply after revert restores the same handles at the same positions;
//!   nodes are never re-created.
//! - Every precondition is checked before the first event is raised.

pub mod log;

use crate::model::node::DescriptionField;
use crate::notify::{NotificationBus, TreeEvent};
use crate::repo::tree_repo::{NodeId, TreeError, TreeResult, TreeStore};

/// Lifecycle of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Applied,
    Reverted,
}

/// Which link operation counts as forward for a child command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildDirection {
    Add,
    Remove,
}

/// Position of a node inside a parent's full child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub parent: NodeId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Child {
        slot: ChildSlot,
        child: NodeId,
        direction: ChildDirection,
    },
    Reparent {
        child: NodeId,
        from: ChildSlot,
        to: ChildSlot,
    },
    Description {
        node: NodeId,
        field: DescriptionField,
        value: String,
    },
    Hidden {
        node: NodeId,
        value: bool,
    },
}

/// One reversible tree mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeCommand {
    text: String,
    state: CommandState,
    operation: Operation,
}

impl TreeCommand {
    /// Inserts `child` into `slot.parent` at `slot.index`.
    pub fn add_child(text: impl Into<String>, slot: ChildSlot, child: NodeId) -> Self {
        Self::new(
            text,
            Operation::Child {
                slot,
                child,
                direction: ChildDirection::Add,
            },
        )
    }

    /// Detaches `child` from `parent`; the index is captured on first apply.
    pub fn remove_child(text: impl Into<String>, parent: NodeId, child: NodeId) -> Self {
        Self::new(
            text,
            Operation::Child {
                slot: ChildSlot { parent, index: 0 },
                child,
                direction: ChildDirection::Remove,
            },
        )
    }

    /// Moves `child` from `from` to `to`. `to.index` is counted after the
    /// child left `from`.
    pub fn reparent(text: impl Into<String>, child: NodeId, from: ChildSlot, to: ChildSlot) -> Self {
        Self::new(text, Operation::Reparent { child, from, to })
    }

    /// Sets one description field of `node` to `value`.
    pub fn set_description(
        text: impl Into<String>,
        node: NodeId,
        field: DescriptionField,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            text,
            Operation::Description {
                node,
                field,
                value: value.into(),
            },
        )
    }

    /// Sets the hidden flag of `node`.
    pub fn set_hidden(text: impl Into<String>, node: NodeId, value: bool) -> Self {
        Self::new(text, Operation::Hidden { node, value })
    }

    fn new(text: impl Into<String>, operation: Operation) -> Self {
        Self {
            text: text.into(),
            state: CommandState::Pending,
            operation,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Node that may end up detached and owned by this command.
    pub fn held_node(&self) -> Option<NodeId> {
        match &self.operation {
            Operation::Child { child, .. } => Some(*child),
            Operation::Reparent { .. } | Operation::Description { .. } | Operation::Hidden { .. } => {
                None
            }
        }
    }

    /// Performs the forward mutation.
    pub fn apply(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) -> TreeResult<()> {
        if self.state == CommandState::Applied {
            return Ok(());
        }
        match &mut self.operation {
            Operation::Child {
                slot,
                child,
                direction: ChildDirection::Add,
            } => insert_child(store, bus, *slot, *child)?,
            Operation::Child {
                slot,
                child,
                direction: ChildDirection::Remove,
            } => slot.index = detach_child(store, bus, slot.parent, *child)?,
            Operation::Reparent { child, from, to } => move_child(store, bus, *child, *from, *to)?,
            Operation::Description { node, field, value } => {
                swap_description(store, bus, *node, *field, value)?
            }
            Operation::Hidden { node, value } => swap_hidden(store, bus, *node, value)?,
        }
        self.state = CommandState::Applied;
        Ok(())
    }

    /// Performs the exact inverse of [`Self::apply`].
    pub fn revert(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) -> TreeResult<()> {
        if self.state != CommandState::Applied {
            return Ok(());
        }
        match &mut self.operation {
            Operation::Child {
                slot,
                child,
                direction: ChildDirection::Add,
            } => {
                detach_child(store, bus, slot.parent, *child)?;
            }
            Operation::Child {
                slot,
                child,
                direction: ChildDirection::Remove,
            } => insert_child(store, bus, *slot, *child)?,
            Operation::Reparent { child, from, to } => move_child(store, bus, *child, *to, *from)?,
            Operation::Description { node, field, value } => {
                swap_description(store, bus, *node, *field, value)?
            }
            Operation::Hidden { node, value } => swap_hidden(store, bus, *node, value)?,
        }
        self.state = CommandState::Reverted;
        Ok(())
    }
}

fn insert_child(
    store: &mut TreeStore,
    bus: &mut NotificationBus,
    slot: ChildSlot,
    child: NodeId,
) -> TreeResult<()> {
    store.check_linkable(slot.parent, child)?;
    let siblings = store.children(slot.parent)?;
    if slot.index > siblings.len() {
        return Err(TreeError::IndexOutOfRange {
            parent: slot.parent,
            index: slot.index,
            len: siblings.len(),
        });
    }
    let before = siblings.get(slot.index).copied();

    bus.emit(
        store,
        slot.parent,
        &TreeEvent::ChildAboutToBeAdded {
            parent: slot.parent,
            before,
            child,
        },
    );
    store.link(slot.parent, child, slot.index)?;
    bus.connect_child(slot.parent, child);
    bus.emit(store, slot.parent, &TreeEvent::ChildAdded { child });
    Ok(())
}

fn detach_child(
    store: &mut TreeStore,
    bus: &mut NotificationBus,
    parent: NodeId,
    child: NodeId,
) -> TreeResult<usize> {
    if store.position(parent, child).is_none() {
        return Err(TreeError::NotAChild { parent, child });
    }

    bus.emit(store, parent, &TreeEvent::ChildAboutToBeRemoved { child });
    let index = store.unlink(parent, child)?;
    bus.disconnect_child(child);
    let before = store.children(parent)?.get(index).copied();
    bus.emit(
        store,
        parent,
        &TreeEvent::ChildRemoved {
            parent,
            before,
            child,
        },
    );
    Ok(index)
}

fn move_child(
    store: &mut TreeStore,
    bus: &mut NotificationBus,
    child: NodeId,
    from: ChildSlot,
    to: ChildSlot,
) -> TreeResult<()> {
    if store.position(from.parent, child) != Some(from.index) {
        return Err(TreeError::NotAChild {
            parent: from.parent,
            child,
        });
    }
    if to.parent == child || store.is_descendant_of(to.parent, child) {
        return Err(TreeError::CycleDetected {
            node: child,
            parent: to.parent,
        });
    }
    let mut len = store.children(to.parent)?.len();
    if to.parent == from.parent {
        len -= 1;
    }
    if to.index > len {
        return Err(TreeError::IndexOutOfRange {
            parent: to.parent,
            index: to.index,
            len,
        });
    }

    detach_child(store, bus, from.parent, child)?;
    insert_child(store, bus, to, child)
}

fn swap_description(
    store: &mut TreeStore,
    bus: &mut NotificationBus,
    node: NodeId,
    field: DescriptionField,
    value: &mut String,
) -> TreeResult<()> {
    store.node(node)?;
    bus.emit(store, node, &TreeEvent::DescriptionAboutToChange { node });
    store.node_mut(node)?.swap_description(field, value);
    bus.emit(store, node, &TreeEvent::DescriptionChanged { node });
    Ok(())
}

fn swap_hidden(
    store: &mut TreeStore,
    bus: &mut NotificationBus,
    node: NodeId,
    value: &mut bool,
) -> TreeResult<()> {
    store.node(node)?;
    bus.emit(store, node, &TreeEvent::HiddenAboutToChange { node });
    let target = store.node_mut(node)?;
    let previous = target.is_hidden();
    target.set_hidden(*value);
    *value = previous;
    bus.emit(store, node, &TreeEvent::HiddenChanged { node });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ChildSlot, CommandState, TreeCommand};
    use crate::model::kind::NodeKind;
    use crate::model::node::{DescriptionField, Node};
    use crate::notify::{EventRecorder, NotificationBus, TreeEvent};
    use crate::repo::tree_repo::{Lifecycle, TreeError, TreeStore};

    #[test]
    fn add_command_round_trips_identity_and_position() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let a = store.create(Node::new(NodeKind::Note, "a"));
        let b = store.create(Node::new(NodeKind::Note, "b"));
        store.link(root, a, 0).unwrap();

        let mut command = TreeCommand::add_child("add b", ChildSlot { parent: root, index: 0 }, b);
        command.apply(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(root).unwrap(), &[b, a]);

        command.revert(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(root).unwrap(), &[a]);
        assert_eq!(store.lifecycle(b).unwrap(), Lifecycle::HeldByCommand);
        assert_eq!(command.state(), CommandState::Reverted);

        command.apply(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(root).unwrap(), &[b, a]);
        assert_eq!(command.state(), CommandState::Applied);
    }

    #[test]
    fn apply_twice_is_a_no_op() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let a = store.create(Node::new(NodeKind::Note, "a"));

        let mut command = TreeCommand::add_child("add a", ChildSlot { parent: root, index: 0 }, a);
        command.apply(&mut store, &mut bus).unwrap();
        command.apply(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(root).unwrap(), &[a]);
    }

    #[test]
    fn remove_command_captures_index_and_emits_neighbor() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let recorder = EventRecorder::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let a = store.create(Node::new(NodeKind::Note, "a"));
        let b = store.create(Node::new(NodeKind::Note, "b"));
        store.link(root, a, 0).unwrap();
        store.link(root, b, 1).unwrap();
        bus.subscribe(root, recorder.clone());

        let mut command = TreeCommand::remove_child("remove a", root, a);
        command.apply(&mut store, &mut bus).unwrap();
        assert_eq!(
            recorder.take(),
            vec![
                TreeEvent::ChildAboutToBeRemoved { child: a },
                TreeEvent::ChildRemoved {
                    parent: root,
                    before: Some(b),
                    child: a
                },
            ]
        );

        command.revert(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(root).unwrap(), &[a, b]);
        assert_eq!(
            recorder.take(),
            vec![
                TreeEvent::ChildAboutToBeAdded {
                    parent: root,
                    before: Some(b),
                    child: a
                },
                TreeEvent::ChildAdded { child: a },
            ]
        );
    }

    #[test]
    fn remove_of_non_child_fails_without_events() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let recorder = EventRecorder::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let stray = store.create(Node::new(NodeKind::Note, "x"));
        bus.subscribe(root, recorder.clone());

        let mut command = TreeCommand::remove_child("remove x", root, stray);
        let err = command.apply(&mut store, &mut bus).unwrap_err();
        assert_eq!(err, TreeError::NotAChild { parent: root, child: stray });
        assert!(recorder.is_empty());
        assert_eq!(command.state(), CommandState::Pending);
    }

    #[test]
    fn reparent_moves_and_reverts_exactly() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let s1 = store.create(Node::new(NodeKind::Spreadsheet, "S1"));
        let s2 = store.create(Node::new(NodeKind::Spreadsheet, "S2"));
        let x = store.create(Node::new(NodeKind::Column, "x"));
        let y = store.create(Node::new(NodeKind::Column, "y"));
        let z = store.create(Node::new(NodeKind::Column, "z"));
        store.link(s1, x, 0).unwrap();
        store.link(s1, y, 1).unwrap();
        store.link(s2, z, 0).unwrap();

        let mut command = TreeCommand::reparent(
            "move x",
            x,
            ChildSlot { parent: s1, index: 0 },
            ChildSlot { parent: s2, index: 1 },
        );
        command.apply(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(s1).unwrap(), &[y]);
        assert_eq!(store.children(s2).unwrap(), &[z, x]);

        command.revert(&mut store, &mut bus).unwrap();
        assert_eq!(store.children(s1).unwrap(), &[x, y]);
        assert_eq!(store.children(s2).unwrap(), &[z]);
        assert_eq!(store.parent(x), Some(s1));
    }

    #[test]
    fn description_command_swaps_and_notifies() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let recorder = EventRecorder::new();
        let node = store.create(Node::new(NodeKind::Note, "old"));
        bus.subscribe(node, recorder.clone());

        let mut command = TreeCommand::set_description("rename", node, DescriptionField::Name, "new");
        command.apply(&mut store, &mut bus).unwrap();
        assert_eq!(store.node(node).unwrap().name(), "new");
        assert_eq!(
            recorder.take(),
            vec![
                TreeEvent::DescriptionAboutToChange { node },
                TreeEvent::DescriptionChanged { node },
            ]
        );

        command.revert(&mut store, &mut bus).unwrap();
        assert_eq!(store.node(node).unwrap().name(), "old");
    }

    #[test]
    fn hidden_command_swaps_flag() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let node = store.create(Node::new(NodeKind::Note, "n"));

        let mut command = TreeCommand::set_hidden("hide", node, true);
        command.apply(&mut store, &mut bus).unwrap();
        assert!(store.node(node).unwrap().is_hidden());
        command.revert(&mut store, &mut bus).unwrap();
        assert!(!store.node(node).unwrap().is_hidden());
    }
}
