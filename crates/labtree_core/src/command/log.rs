//! Linear undo/redo history with macro grouping.
//!
//! # Responsibility
//! - Record applied commands as history entries, grouping commands issued
//!   between `begin_macro`/`end_macro` into one entry.
//! - Walk the history backwards and forwards.
//! - Release nodes that only discarded commands were keeping alive.
//!
//! # Invariants
//! - Entries `[0, cursor)` are applied, entries `[cursor, len)` are
//!   reverted and form the redo tail.
//! - Recording a new command drops the redo tail.
//! - Nested macros flatten into the outermost one; an empty macro leaves no
//!   entry.
//! - Undo and redo are refused while a macro is open.
//! - A failed undo or redo leaves the cursor and the entry where they were.
//! - The undo limit only trims applied entries; a pending redo tail is kept
//!   until it is replayed or dropped.

use crate::command::TreeCommand;
use crate::notify::NotificationBus;
use crate::repo::tree_repo::{Lifecycle, NodeId, TreeError, TreeResult, TreeStore};
use log::{debug, warn};
use std::collections::HashSet;

/// One undoable step: a single command or a closed macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    text: String,
    commands: Vec<TreeCommand>,
}

impl LogEntry {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Undo/redo history of one project.
#[derive(Debug, Default)]
pub struct CommandLog {
    entries: Vec<LogEntry>,
    cursor: usize,
    open_macros: Vec<LogEntry>,
    undo_limit: usize,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// History keeping at most `limit` entries; `0` keeps everything.
    pub fn with_undo_limit(limit: usize) -> Self {
        Self {
            undo_limit: limit,
            ..Self::default()
        }
    }

    pub fn undo_limit(&self) -> usize {
        self.undo_limit
    }

    /// Number of entries, applied and reverted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of applied entries.
    pub fn index(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_recording_macro(&self) -> bool {
        !self.open_macros.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.is_recording_macro() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.is_recording_macro() && self.cursor < self.entries.len()
    }

    /// Text of the entry the next undo reverts.
    pub fn undo_text(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
            .map(LogEntry::text)
    }

    /// Text of the entry the next redo applies.
    pub fn redo_text(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(LogEntry::text)
    }

    /// Opens a macro. Nested calls only deepen the nesting.
    pub fn begin_macro(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!(
            "event=macro_begin module=command depth={} text={:?}",
            self.open_macros.len() + 1,
            text
        );
        self.open_macros.push(LogEntry {
            text,
            commands: Vec::new(),
        });
    }

    /// Closes the innermost macro. Closing the outermost one turns the
    /// grouped commands into a single history entry.
    pub fn end_macro(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) -> TreeResult<()> {
        let finished = self.open_macros.pop().ok_or(TreeError::NoOpenMacro)?;
        debug!(
            "event=macro_end module=command depth={} commands={}",
            self.open_macros.len() + 1,
            finished.commands.len()
        );
        if let Some(outer) = self.open_macros.last_mut() {
            outer.commands.extend(finished.commands);
            return Ok(());
        }
        if finished.commands.is_empty() {
            return Ok(());
        }
        self.push_entry(finished, store, bus);
        Ok(())
    }

    /// Records an already applied command.
    pub fn record(&mut self, command: TreeCommand, store: &mut TreeStore, bus: &mut NotificationBus) {
        self.drop_redo_tail(store, bus);
        if let Some(open) = self.open_macros.last_mut() {
            open.commands.push(command);
            return;
        }
        let entry = LogEntry {
            text: command.text().to_string(),
            commands: vec![command],
        };
        self.push_entry(entry, store, bus);
    }

    /// Reverts the latest applied entry. Returns `false` when there is
    /// nothing to undo or a macro is open.
    pub fn undo(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) -> TreeResult<bool> {
        if self.is_recording_macro() {
            warn!("event=undo module=command status=refused reason=macro_open");
            return Ok(false);
        }
        if self.cursor == 0 {
            return Ok(false);
        }
        let index = self.cursor - 1;
        let entry = &mut self.entries[index];
        revert_all(&mut entry.commands, store, bus)?;
        debug!("event=undo module=command status=ok text={:?}", entry.text);
        self.cursor = index;
        Ok(true)
    }

    /// Re-applies the next reverted entry. Returns `false` when there is
    /// nothing to redo or a macro is open.
    pub fn redo(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) -> TreeResult<bool> {
        if self.is_recording_macro() {
            warn!("event=redo module=command status=refused reason=macro_open");
            return Ok(false);
        }
        let Some(entry) = self.entries.get_mut(self.cursor) else {
            return Ok(false);
        };
        apply_all(&mut entry.commands, store, bus)?;
        debug!("event=redo module=command status=ok text={:?}", entry.text);
        self.cursor += 1;
        self.enforce_limit(store, bus);
        Ok(true)
    }

    /// Drops all history entries. Open macros stay open.
    pub fn clear(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) {
        let discarded: Vec<TreeCommand> = self
            .entries
            .drain(..)
            .flat_map(|entry| entry.commands)
            .collect();
        self.cursor = 0;
        release_unreferenced(discarded, Some(self), store, bus);
    }

    /// Changes the entry limit and trims the oldest entries beyond it.
    pub fn set_undo_limit(&mut self, limit: usize, store: &mut TreeStore, bus: &mut NotificationBus) {
        self.undo_limit = limit;
        self.enforce_limit(store, bus);
    }

    /// Nodes that some entry may re-attach or detach again.
    pub(crate) fn referenced_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries
            .iter()
            .chain(self.open_macros.iter())
            .flat_map(|entry| entry.commands.iter())
            .filter_map(TreeCommand::held_node)
    }

    fn push_entry(&mut self, entry: LogEntry, store: &mut TreeStore, bus: &mut NotificationBus) {
        self.drop_redo_tail(store, bus);
        debug!(
            "event=log_push module=command index={} text={:?}",
            self.cursor, entry.text
        );
        self.entries.push(entry);
        self.cursor = self.entries.len();
        self.enforce_limit(store, bus);
    }

    fn drop_redo_tail(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) {
        if self.cursor == self.entries.len() {
            return;
        }
        let discarded: Vec<TreeCommand> = self
            .entries
            .drain(self.cursor..)
            .flat_map(|entry| entry.commands)
            .collect();
        release_unreferenced(discarded, Some(self), store, bus);
    }

    fn enforce_limit(&mut self, store: &mut TreeStore, bus: &mut NotificationBus) {
        if self.undo_limit == 0 || self.entries.len() <= self.undo_limit {
            return;
        }
        // Reverted entries are still needed by redo.
        let excess = (self.entries.len() - self.undo_limit).min(self.cursor);
        if excess == 0 {
            return;
        }
        let discarded: Vec<TreeCommand> = self
            .entries
            .drain(..excess)
            .flat_map(|entry| entry.commands)
            .collect();
        self.cursor -= excess;
        release_unreferenced(discarded, Some(self), store, bus);
    }
}

/// Reverts `commands` back to front. On failure the already reverted
/// commands are re-applied so the entry stays applied as a whole.
fn revert_all(
    commands: &mut [TreeCommand],
    store: &mut TreeStore,
    bus: &mut NotificationBus,
) -> TreeResult<()> {
    for position in (0..commands.len()).rev() {
        if let Err(err) = commands[position].revert(store, bus) {
            warn!(
                "event=undo module=command status=error command={:?} error={}",
                commands[position].text(),
                err
            );
            for done in &mut commands[position + 1..] {
                if let Err(rollback_err) = done.apply(store, bus) {
                    warn!(
                        "event=undo_rollback module=command status=error error={}",
                        rollback_err
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Applies `commands` front to back, reverting the applied prefix on failure.
fn apply_all(
    commands: &mut [TreeCommand],
    store: &mut TreeStore,
    bus: &mut NotificationBus,
) -> TreeResult<()> {
    for position in 0..commands.len() {
        if let Err(err) = commands[position].apply(store, bus) {
            warn!(
                "event=redo module=command status=error command={:?} error={}",
                commands[position].text(),
                err
            );
            for done in commands[..position].iter_mut().rev() {
                if let Err(rollback_err) = done.revert(store, bus) {
                    warn!(
                        "event=redo_rollback module=command status=error error={}",
                        rollback_err
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Destroys nodes held by `commands` that no entry of `log` refers to.
///
/// Only nodes still in the `HeldByCommand` state are destroyed, together with
/// their subtrees. Returns the destroyed handles.
pub fn release_unreferenced(
    commands: Vec<TreeCommand>,
    log: Option<&CommandLog>,
    store: &mut TreeStore,
    bus: &mut NotificationBus,
) -> Vec<NodeId> {
    let candidates: Vec<NodeId> = commands.iter().filter_map(TreeCommand::held_node).collect();
    if candidates.is_empty() {
        return Vec::new();
    }
    let referenced: HashSet<NodeId> = log
        .map(|log| log.referenced_nodes().collect())
        .unwrap_or_default();

    let mut destroyed = Vec::new();
    for node in candidates {
        if referenced.contains(&node) || store.lifecycle(node) != Ok(Lifecycle::HeldByCommand) {
            continue;
        }
        match store.destroy(node) {
            Ok(ids) => destroyed.extend(ids),
            Err(err) => warn!(
                "event=node_release module=command status=error node={} error={}",
                node, err
            ),
        }
    }
    if !destroyed.is_empty() {
        bus.forget(&destroyed);
        debug!(
            "event=node_release module=command status=ok destroyed={}",
            destroyed.len()
        );
    }
    destroyed
}

#[cfg(test)]
mod tests {
    use super::CommandLog;
    use crate::command::{ChildSlot, TreeCommand};
    use crate::model::kind::NodeKind;
    use crate::model::node::{DescriptionField, Node};
    use crate::notify::NotificationBus;
    use crate::repo::tree_repo::{NodeId, TreeError, TreeStore};

    fn applied(
        mut command: TreeCommand,
        store: &mut TreeStore,
        bus: &mut NotificationBus,
    ) -> TreeCommand {
        command.apply(store, bus).unwrap();
        command
    }

    fn rename(node: NodeId, name: &str) -> TreeCommand {
        TreeCommand::set_description(format!("rename to {name}"), node, DescriptionField::Name, name)
    }

    #[test]
    fn undo_and_redo_walk_the_history() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();
        let node = store.create(Node::new(NodeKind::Note, "a"));

        let first = applied(rename(node, "b"), &mut store, &mut bus);
        log.record(first, &mut store, &mut bus);
        let second = applied(rename(node, "c"), &mut store, &mut bus);
        log.record(second, &mut store, &mut bus);
        assert_eq!(log.undo_text(), Some("rename to c"));

        assert!(log.undo(&mut store, &mut bus).unwrap());
        assert_eq!(store.node(node).unwrap().name(), "b");
        assert_eq!(log.redo_text(), Some("rename to c"));
        assert!(log.undo(&mut store, &mut bus).unwrap());
        assert_eq!(store.node(node).unwrap().name(), "a");
        assert!(!log.undo(&mut store, &mut bus).unwrap());

        assert!(log.redo(&mut store, &mut bus).unwrap());
        assert!(log.redo(&mut store, &mut bus).unwrap());
        assert_eq!(store.node(node).unwrap().name(), "c");
        assert!(!log.redo(&mut store, &mut bus).unwrap());
    }

    #[test]
    fn nested_macros_flatten_into_one_entry() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();
        let node = store.create(Node::new(NodeKind::Note, "a"));

        log.begin_macro("outer");
        let command = applied(rename(node, "b"), &mut store, &mut bus);
        log.record(command, &mut store, &mut bus);
        log.begin_macro("inner");
        let command = applied(rename(node, "c"), &mut store, &mut bus);
        log.record(command, &mut store, &mut bus);
        log.end_macro(&mut store, &mut bus).unwrap();
        assert!(!log.can_undo());
        log.end_macro(&mut store, &mut bus).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].len(), 2);
        assert_eq!(log.undo_text(), Some("outer"));
        log.undo(&mut store, &mut bus).unwrap();
        assert_eq!(store.node(node).unwrap().name(), "a");
    }

    #[test]
    fn empty_macro_leaves_no_entry_and_unbalanced_end_fails() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();

        log.begin_macro("nothing");
        log.end_macro(&mut store, &mut bus).unwrap();
        assert!(log.is_empty());
        assert_eq!(
            log.end_macro(&mut store, &mut bus).unwrap_err(),
            TreeError::NoOpenMacro
        );
    }

    #[test]
    fn new_command_discards_redo_tail_and_releases_held_nodes() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let child = store.create(Node::new(NodeKind::Note, "n"));

        let add = applied(
            TreeCommand::add_child("add", ChildSlot { parent: root, index: 0 }, child),
            &mut store,
            &mut bus,
        );
        log.record(add, &mut store, &mut bus);
        log.undo(&mut store, &mut bus).unwrap();
        assert!(store.contains(child));

        let command = applied(rename(root, "G"), &mut store, &mut bus);
        log.record(command, &mut store, &mut bus);
        assert!(!log.can_redo());
        assert!(!store.contains(child));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn undo_limit_drops_oldest_entries() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::with_undo_limit(2);
        let node = store.create(Node::new(NodeKind::Note, "a"));

        for name in ["b", "c", "d"] {
            let command = applied(rename(node, name), &mut store, &mut bus);
            log.record(command, &mut store, &mut bus);
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.index(), 2);
        log.undo(&mut store, &mut bus).unwrap();
        log.undo(&mut store, &mut bus).unwrap();
        assert!(!log.can_undo());
        assert_eq!(store.node(node).unwrap().name(), "b");
    }

    #[test]
    fn clear_releases_removed_nodes_but_keeps_attached_ones() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let kept = store.create(Node::new(NodeKind::Note, "kept"));
        let removed = store.create(Node::new(NodeKind::Note, "removed"));
        store.link(root, kept, 0).unwrap();
        store.link(root, removed, 1).unwrap();

        let command = applied(TreeCommand::remove_child("remove", root, removed), &mut store, &mut bus);
        log.record(command, &mut store, &mut bus);
        log.clear(&mut store, &mut bus);

        assert!(log.is_empty());
        assert!(store.contains(kept));
        assert!(!store.contains(removed));
    }

    #[test]
    fn failed_redo_keeps_the_cursor() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();
        let root = store.create(Node::new(NodeKind::Folder, "F"));
        let other = store.create(Node::new(NodeKind::Folder, "G"));
        let child = store.create(Node::new(NodeKind::Note, "n"));

        let add = applied(
            TreeCommand::add_child("add", ChildSlot { parent: root, index: 0 }, child),
            &mut store,
            &mut bus,
        );
        log.record(add, &mut store, &mut bus);
        log.undo(&mut store, &mut bus).unwrap();
        store.link(other, child, 0).unwrap();

        assert_eq!(
            log.redo(&mut store, &mut bus).unwrap_err(),
            TreeError::AlreadyOwned {
                child,
                parent: other
            }
        );
        assert_eq!(log.index(), 0);
        assert!(log.can_redo());
        assert!(store.children(root).unwrap().is_empty());
    }

    #[test]
    fn lowering_the_limit_spares_the_redo_tail() {
        let mut store = TreeStore::new();
        let mut bus = NotificationBus::new();
        let mut log = CommandLog::new();
        let node = store.create(Node::new(NodeKind::Note, "a"));

        for name in ["b", "c", "d"] {
            let command = applied(rename(node, name), &mut store, &mut bus);
            log.record(command, &mut store, &mut bus);
        }
        log.undo(&mut store, &mut bus).unwrap();
        log.undo(&mut store, &mut bus).unwrap();
        log.set_undo_limit(1, &mut store, &mut bus);
        assert_eq!(log.len(), 2);
        assert_eq!(log.index(), 0);

        assert!(log.redo(&mut store, &mut bus).unwrap());
        assert!(log.redo(&mut store, &mut bus).unwrap());
        assert_eq!(log.len(), 1);
        assert_eq!(store.node(node).unwrap().name(), "d");
    }
}
