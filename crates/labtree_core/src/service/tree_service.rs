//! Ownership tree use-case service.
//!
//! # Responsibility
//! - Expose node insertion, removal, reparenting, renaming and visibility
//!   changes as undoable operations.
//! - Decide per operation whether it is recorded in the project history or
//!   applied immediately and discarded.
//! - Keep the project's unsaved-changes flag current.
//!
//! # Invariants
//! - Every precondition is checked before the first command is applied; a
//!   failing operation leaves the tree and history untouched.
//! - Multi-command operations form one history entry.
//! - Sibling names stay unique unless a caller explicitly opts out with
//!   [`NameHandling::UniqueNotRequired`].
//! - Only the project root's subtree is recorded; free-floating subtrees are
//!   mutated immediately with identical semantics.

use crate::command::log::{release_unreferenced, CommandLog};
use crate::command::{ChildSlot, TreeCommand};
use crate::config::TreeConfig;
use crate::model::kind::{ChildFilter, NodeKind};
use crate::model::naming::{unique_name_for, NameHandling};
use crate::model::node::{normalize_name, DescriptionField, Node, DEFAULT_CAPTION_SPEC};
use crate::notify::{NotificationBus, SubscriptionId, TreeEvent, TreeObserver};
use crate::repo::tree_repo::{Lifecycle, NodeId, TreeError, TreeResult, TreeStore};
use crate::serialize::NodeTemplate;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::rc::Rc;

/// Project tree facade: arena, notification bus and undo history.
pub struct AspectTree {
    store: TreeStore,
    bus: NotificationBus,
    log: Option<CommandLog>,
    project: NodeId,
    changed: bool,
    detached_macro_depth: usize,
    config: TreeConfig,
}

impl AspectTree {
    /// Creates a tree whose root is `project`, with undo history enabled.
    pub fn new(project: Node) -> Self {
        Self::with_config(project, TreeConfig::default())
    }

    /// Creates a tree with injected configuration.
    pub fn with_config(project: Node, config: TreeConfig) -> Self {
        let mut store = TreeStore::new();
        let project = store.create(project);
        let log = config
            .undo_enabled
            .then(|| CommandLog::with_undo_limit(config.undo_limit));
        info!(
            "event=tree_open module=tree status=ok undo_enabled={} undo_limit={}",
            config.undo_enabled, config.undo_limit
        );
        Self {
            store,
            bus: NotificationBus::new(),
            log,
            project,
            changed: false,
            detached_macro_depth: 0,
            config,
        }
    }

    pub fn project_root(&self) -> NodeId {
        self.project
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Read access to the arena.
    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.store.node(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.store.parent(id)
    }

    /// Visible children of any kind.
    pub fn children(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        self.store.filtered_children(id, ChildFilter::visible())
    }

    pub fn filtered_children(&self, id: NodeId, filter: ChildFilter) -> TreeResult<Vec<NodeId>> {
        self.store.filtered_children(id, filter)
    }

    /// Whether `id` belongs to the project root's subtree.
    pub fn is_in_project(&self, id: NodeId) -> bool {
        self.store.contains(id) && self.store.root_of(id) == self.project
    }

    /// Creates a free-floating node using the configured caption template.
    pub fn create_node(&mut self, kind: NodeKind, name: impl Into<String>) -> NodeId {
        let node = Node::new(kind, name).with_caption_spec(self.config.default_caption_spec.clone());
        self.store.create(node)
    }

    /// Stores a prebuilt free-floating node.
    pub fn create_from(&mut self, node: Node) -> NodeId {
        self.store.create(node)
    }

    /// Destroys a free-floating node and its subtree.
    ///
    /// Nodes held by history commands stay alive until the history lets go
    /// of them. Descendants the history still refers to are detached from
    /// the subtree and survive it.
    pub fn discard(&mut self, id: NodeId) -> TreeResult<()> {
        if id == self.project {
            return Err(TreeError::ProjectRoot(id));
        }
        match self.store.lifecycle(id)? {
            Lifecycle::Attached(_) => Err(TreeError::StillAttached(id)),
            Lifecycle::HeldByCommand => Ok(()),
            Lifecycle::Root => {
                let referenced: HashSet<NodeId> = self
                    .log
                    .as_ref()
                    .map(|log| log.referenced_nodes().collect())
                    .unwrap_or_default();
                if referenced.contains(&id) {
                    return Ok(());
                }
                let kept = self.hand_back_to_history(id, &referenced)?;
                let destroyed = self.store.destroy(id)?;
                self.bus.forget(&destroyed);
                debug!(
                    "event=node_discard module=tree status=ok node={} destroyed={} kept={}",
                    id,
                    destroyed.len(),
                    kept
                );
                Ok(())
            }
        }
    }

    /// Detaches every descendant of `root` that history entries still refer
    /// to, leaving it held by those commands. Returns how many were detached.
    fn hand_back_to_history(
        &mut self,
        root: NodeId,
        referenced: &HashSet<NodeId>,
    ) -> TreeResult<usize> {
        if referenced.is_empty() {
            return Ok(0);
        }
        let mut kept = 0;
        let mut pending = vec![root];
        while let Some(current) = pending.pop() {
            for child in self.store.children(current)?.to_vec() {
                if referenced.contains(&child) {
                    self.store.unlink(current, child)?;
                    self.bus.disconnect_child(child);
                    kept += 1;
                } else {
                    pending.push(child);
                }
            }
        }
        Ok(kept)
    }

    /// Builds loaded nodes below `parent` without history or notifications.
    ///
    /// Only meant for subtrees nobody observes yet: a fresh project root or
    /// a free-floating node.
    pub(crate) fn graft_children(
        &mut self,
        parent: NodeId,
        children: Vec<NodeTemplate>,
    ) -> TreeResult<()> {
        for template in children {
            let child = self.store.create(template.node);
            let index = self.store.children(parent)?.len();
            self.store.link(parent, child, index)?;
            self.bus.connect_child(parent, child);
            self.graft_children(child, template.children)?;
        }
        Ok(())
    }

    /// Subscribes `observer` to everything raised on `channel` or below it.
    pub fn subscribe(&mut self, channel: NodeId, observer: Rc<dyn TreeObserver>) -> SubscriptionId {
        self.bus.subscribe(channel, observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Raises a status message on `node`'s channel.
    pub fn info(&mut self, node: NodeId, message: impl Into<String>) {
        let event = TreeEvent::StatusInfo {
            node,
            message: message.into(),
        };
        self.bus.emit(&self.store, node, &event);
    }

    /// Asks views showing `node` to start editing its name.
    pub fn request_rename(&mut self, node: NodeId) -> TreeResult<()> {
        self.store.node(node)?;
        self.bus
            .emit(&self.store, node, &TreeEvent::RenameRequested { node });
        Ok(())
    }

    /// Appends `child` to `parent`, renaming it first if its name collides.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let index = self.store.children(parent)?.len();
        self.insert_child_at(parent, child, index)
    }

    /// Inserts `child` in front of `before`, or appends when `before` is
    /// `None` or not a child of `parent`.
    pub fn insert_child_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> TreeResult<()> {
        let len = self.store.children(parent)?.len();
        let index = before
            .and_then(|before| self.store.position(parent, before))
            .unwrap_or(len);
        self.insert_child_at(parent, child, index)
    }

    fn insert_child_at(&mut self, parent: NodeId, child: NodeId, index: usize) -> TreeResult<()> {
        self.store.check_linkable(parent, child)?;
        if child == self.project {
            return Err(TreeError::ProjectRoot(child));
        }
        let parent_name = self.store.node(parent)?.name().to_string();
        let current_name = self.store.node(child)?.name().to_string();
        let new_name = unique_name_for(&current_name, self.store.child_names(parent)?);

        let mut commands = Vec::with_capacity(2);
        if new_name != current_name {
            self.info(
                parent,
                format!(
                    "Renaming \"{current_name}\" to \"{new_name}\" in order to avoid name collision."
                ),
            );
            commands.push(TreeCommand::set_description(
                format!("{current_name}: rename to {new_name}"),
                child,
                DescriptionField::Name,
                new_name.clone(),
            ));
        }
        commands.push(TreeCommand::add_child(
            format!("{parent_name}: add {new_name}"),
            ChildSlot { parent, index },
            child,
        ));

        self.execute(parent, format!("{parent_name}: add {new_name}"), commands)?;
        info!(
            "event=node_add module=tree status=ok parent={} child={} index={}",
            parent, child, index
        );
        Ok(())
    }

    /// Detaches `child` from `parent`. The node stays alive while the
    /// history can still restore it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.store.node(parent)?;
        if self.store.position(parent, child).is_none() {
            return Err(TreeError::NotAChild { parent, child });
        }
        let text = format!(
            "{}: remove {}",
            self.store.node(parent)?.name(),
            self.store.node(child)?.name()
        );
        self.execute(parent, text.clone(), vec![TreeCommand::remove_child(text, parent, child)])?;
        info!(
            "event=node_remove module=tree status=ok parent={} child={}",
            parent, child
        );
        Ok(())
    }

    /// Detaches `node` from its parent.
    pub fn remove(&mut self, node: NodeId) -> TreeResult<()> {
        let parent = self.store.parent(node).ok_or(TreeError::NoParent(node))?;
        self.remove_child(parent, node)
    }

    /// Removes every child of `parent`, hidden ones included, as one step.
    pub fn remove_all_children(&mut self, parent: NodeId) -> TreeResult<()> {
        let parent_name = self.store.node(parent)?.name().to_string();
        let children = self.store.children(parent)?.to_vec();
        if children.is_empty() {
            return Ok(());
        }
        let commands = children
            .iter()
            .map(|child| {
                let child_name = self.store.node(*child)?.name();
                Ok(TreeCommand::remove_child(
                    format!("{parent_name}: remove {child_name}"),
                    parent,
                    *child,
                ))
            })
            .collect::<TreeResult<Vec<_>>>()?;
        self.execute(parent, format!("{parent_name}: remove all children"), commands)?;
        info!(
            "event=node_remove_all module=tree status=ok parent={} count={}",
            parent,
            children.len()
        );
        Ok(())
    }

    /// Moves `node` under `new_parent` at `new_index` (`None` appends), as
    /// one step.
    ///
    /// `new_index` counts all children of `new_parent` after `node` left its
    /// old position. A name collision in the new parent is resolved like in
    /// [`Self::add_child`].
    pub fn reparent(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        new_index: Option<usize>,
    ) -> TreeResult<()> {
        let old_parent = self.store.parent(node).ok_or(TreeError::NoParent(node))?;
        self.store.node(new_parent)?;
        if self.would_create_cycle(node, new_parent) {
            return Err(TreeError::CycleDetected {
                node,
                parent: new_parent,
            });
        }
        let old_index = self
            .store
            .position(old_parent, node)
            .ok_or(TreeError::NotAChild {
                parent: old_parent,
                child: node,
            })?;
        let mut len = self.store.children(new_parent)?.len();
        if new_parent == old_parent {
            len -= 1;
        }
        let index = new_index.unwrap_or(len);
        if index > len {
            return Err(TreeError::IndexOutOfRange {
                parent: new_parent,
                index,
                len,
            });
        }

        let current_name = self.store.node(node)?.name().to_string();
        let parent_name = self.store.node(new_parent)?.name().to_string();
        let text = format!("{current_name}: move to {parent_name}");
        let mut commands = Vec::with_capacity(2);
        if new_parent != old_parent {
            let new_name = unique_name_for(&current_name, self.store.child_names(new_parent)?);
            if new_name != current_name {
                self.info(
                    new_parent,
                    format!(
                        "Renaming \"{current_name}\" to \"{new_name}\" in order to avoid name collision."
                    ),
                );
                commands.push(TreeCommand::set_description(
                    format!("{current_name}: rename to {new_name}"),
                    node,
                    DescriptionField::Name,
                    new_name,
                ));
            }
        }
        commands.push(TreeCommand::reparent(
            text.clone(),
            node,
            ChildSlot {
                parent: old_parent,
                index: old_index,
            },
            ChildSlot {
                parent: new_parent,
                index,
            },
        ));

        let tracking_anchor = if self.is_in_project(old_parent) {
            old_parent
        } else {
            new_parent
        };
        self.execute(tracking_anchor, text, commands)?;
        info!(
            "event=node_move module=tree status=ok node={} from={} to={} index={}",
            node, old_parent, new_parent, index
        );
        Ok(())
    }

    /// Swaps `node` with the previous visible sibling. Returns `false` when
    /// it already comes first.
    pub fn move_up(&mut self, node: NodeId) -> TreeResult<bool> {
        let parent = self.store.parent(node).ok_or(TreeError::NoParent(node))?;
        let Some(visible_index) = self.store.index_of_child(parent, node, ChildFilter::visible())
        else {
            return Ok(false);
        };
        let Some(previous) = visible_index
            .checked_sub(1)
            .and_then(|index| self.store.child_at(parent, index, ChildFilter::visible()))
        else {
            return Ok(false);
        };
        let target = self
            .store
            .position(parent, previous)
            .ok_or(TreeError::NotAChild {
                parent,
                child: previous,
            })?;
        self.move_within(parent, node, target, "move up")
    }

    /// Swaps `node` with the next visible sibling. Returns `false` when it
    /// already comes last.
    pub fn move_down(&mut self, node: NodeId) -> TreeResult<bool> {
        let parent = self.store.parent(node).ok_or(TreeError::NoParent(node))?;
        let Some(visible_index) = self.store.index_of_child(parent, node, ChildFilter::visible())
        else {
            return Ok(false);
        };
        let Some(next) = self
            .store
            .child_at(parent, visible_index + 1, ChildFilter::visible())
        else {
            return Ok(false);
        };
        // Counted after `node` is taken out, this slot lies just past `next`.
        let target = self
            .store
            .position(parent, next)
            .ok_or(TreeError::NotAChild { parent, child: next })?;
        self.move_within(parent, node, target, "move down")
    }

    fn move_within(
        &mut self,
        parent: NodeId,
        node: NodeId,
        target: usize,
        verb: &str,
    ) -> TreeResult<bool> {
        let from = self
            .store
            .position(parent, node)
            .ok_or(TreeError::NotAChild {
                parent,
                child: node,
            })?;
        let text = format!("{}: {verb}", self.store.node(node)?.name());
        let command = TreeCommand::reparent(
            text.clone(),
            node,
            ChildSlot {
                parent,
                index: from,
            },
            ChildSlot {
                parent,
                index: target,
            },
        );
        self.execute(parent, text, vec![command])?;
        debug!(
            "event=node_move module=tree status=ok node={} from_index={} to_index={}",
            node, from, target
        );
        Ok(true)
    }

    /// Renames `node`.
    ///
    /// Returns `false` only when `handling` is
    /// [`NameHandling::UniqueRequired`] and the name is taken; nothing
    /// changes in that case.
    pub fn set_name(
        &mut self,
        node: NodeId,
        value: impl Into<String>,
        handling: NameHandling,
    ) -> TreeResult<bool> {
        let value = normalize_name(value.into());
        let current = self.store.node(node)?.name().to_string();
        if value == current {
            return Ok(true);
        }

        let new_name = match (self.store.parent(node), handling) {
            (None, _) | (_, NameHandling::UniqueNotRequired) => value.clone(),
            (Some(parent), _) => {
                let siblings = self
                    .store
                    .children(parent)?
                    .iter()
                    .filter(|sibling| **sibling != node)
                    .map(|sibling| self.store.node(*sibling).map(Node::name))
                    .collect::<TreeResult<Vec<_>>>()?;
                unique_name_for(&value, siblings)
            }
        };
        if new_name == current {
            return Ok(true);
        }
        if new_name != value {
            if handling == NameHandling::UniqueRequired {
                debug!(
                    "event=node_rename module=tree status=rejected node={} reason=name_taken",
                    node
                );
                return Ok(false);
            }
            self.info(
                node,
                format!(
                    "Intended name \"{value}\" was changed to \"{new_name}\" in order to avoid name collision."
                ),
            );
        }

        let text = format!("{current}: rename to {new_name}");
        let command =
            TreeCommand::set_description(text.clone(), node, DescriptionField::Name, new_name);
        self.execute(node, text, vec![command])?;
        info!("event=node_rename module=tree status=ok node={}", node);
        Ok(true)
    }

    pub fn set_comment(&mut self, node: NodeId, value: impl Into<String>) -> TreeResult<()> {
        self.set_description(node, DescriptionField::Comment, value.into(), "change comment")
    }

    pub fn set_caption_spec(&mut self, node: NodeId, value: impl Into<String>) -> TreeResult<()> {
        self.set_description(node, DescriptionField::CaptionSpec, value.into(), "set caption")
    }

    fn set_description(
        &mut self,
        node: NodeId,
        field: DescriptionField,
        value: String,
        verb: &str,
    ) -> TreeResult<()> {
        let target = self.store.node(node)?;
        if target.description(field) == value {
            return Ok(());
        }
        let text = format!("{}: {verb}", target.name());
        let command = TreeCommand::set_description(text.clone(), node, field, value);
        self.execute(node, text, vec![command])?;
        debug!(
            "event=node_describe module=tree status=ok node={} field={:?}",
            node, field
        );
        Ok(())
    }

    /// Hides or shows `node`, undoably.
    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) -> TreeResult<()> {
        let target = self.store.node(node)?;
        if target.is_hidden() == hidden {
            return Ok(());
        }
        let verb = if hidden { "hide" } else { "show" };
        let text = format!("{}: {verb}", target.name());
        let command = TreeCommand::set_hidden(text.clone(), node, hidden);
        self.execute(node, text, vec![command])?;
        debug!(
            "event=node_hidden module=tree status=ok node={} hidden={}",
            node, hidden
        );
        Ok(())
    }

    /// Overrides the creation time. Not recorded in the history.
    pub fn set_creation_time(&mut self, node: NodeId, time: NaiveDateTime) -> TreeResult<()> {
        self.store.node_mut(node)?.set_creation_time(time);
        Ok(())
    }

    /// Resets `node`'s caption template to the configured default.
    pub fn reset_caption_spec(&mut self, node: NodeId) -> TreeResult<()> {
        let spec = if self.config.default_caption_spec.is_empty() {
            DEFAULT_CAPTION_SPEC.to_string()
        } else {
            self.config.default_caption_spec.clone()
        };
        self.set_caption_spec(node, spec)
    }

    /// Starts grouping subsequent operations into one history entry.
    pub fn begin_macro(&mut self, text: impl Into<String>) {
        match self.log.as_mut() {
            Some(log) => log.begin_macro(text),
            None => self.detached_macro_depth += 1,
        }
    }

    /// Closes the innermost macro.
    pub fn end_macro(&mut self) -> TreeResult<()> {
        match self.log.as_mut() {
            Some(log) => log.end_macro(&mut self.store, &mut self.bus),
            None => {
                self.detached_macro_depth = self
                    .detached_macro_depth
                    .checked_sub(1)
                    .ok_or(TreeError::NoOpenMacro)?;
                Ok(())
            }
        }
    }

    /// Reverts the latest history entry. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> TreeResult<bool> {
        let Some(log) = self.log.as_mut() else {
            return Ok(false);
        };
        let undone = log.undo(&mut self.store, &mut self.bus)?;
        if undone {
            self.changed = true;
        }
        Ok(undone)
    }

    /// Re-applies the next undone history entry. Returns `false` when there
    /// is nothing to redo.
    pub fn redo(&mut self) -> TreeResult<bool> {
        let Some(log) = self.log.as_mut() else {
            return Ok(false);
        };
        let redone = log.redo(&mut self.store, &mut self.bus)?;
        if redone {
            self.changed = true;
        }
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.log.as_ref().is_some_and(CommandLog::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.log.as_ref().is_some_and(CommandLog::can_redo)
    }

    pub fn undo_text(&self) -> Option<&str> {
        self.log.as_ref().and_then(CommandLog::undo_text)
    }

    pub fn redo_text(&self) -> Option<&str> {
        self.log.as_ref().and_then(CommandLog::redo_text)
    }

    /// Number of entries that can currently be undone.
    pub fn undo_count(&self) -> usize {
        self.log.as_ref().map_or(0, CommandLog::index)
    }

    pub fn history(&self) -> Option<&CommandLog> {
        self.log.as_ref()
    }

    /// Drops the whole history, releasing nodes only it kept alive.
    pub fn clear_undo(&mut self) {
        if let Some(log) = self.log.as_mut() {
            log.clear(&mut self.store, &mut self.bus);
            info!("event=undo_clear module=tree status=ok");
        }
    }

    pub fn set_undo_limit(&mut self, limit: usize) {
        self.config.undo_limit = limit;
        if let Some(log) = self.log.as_mut() {
            log.set_undo_limit(limit, &mut self.store, &mut self.bus);
        }
    }

    /// Starts recording history with an empty log.
    pub fn attach_log(&mut self) {
        if self.log.is_none() {
            self.log = Some(CommandLog::with_undo_limit(self.config.undo_limit));
            self.config.undo_enabled = true;
        }
    }

    /// Stops recording history; later operations apply immediately.
    pub fn detach_log(&mut self) {
        if let Some(mut log) = self.log.take() {
            log.clear(&mut self.store, &mut self.bus);
        }
        self.config.undo_enabled = false;
    }

    /// Whether the project changed since it was created or last saved.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_saved(&mut self) {
        self.changed = false;
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Applies `commands` in order and records them as one step.
    ///
    /// `anchor` decides whether the step belongs to the project history.
    fn execute(&mut self, anchor: NodeId, text: String, commands: Vec<TreeCommand>) -> TreeResult<()> {
        let mut applied: Vec<TreeCommand> = Vec::with_capacity(commands.len());
        for mut command in commands {
            if let Err(err) = command.apply(&mut self.store, &mut self.bus) {
                warn!(
                    "event=command_apply module=tree status=error anchor={} error={}",
                    anchor, err
                );
                for mut done in applied.into_iter().rev() {
                    if let Err(revert_err) = done.revert(&mut self.store, &mut self.bus) {
                        warn!(
                            "event=command_revert module=tree status=error anchor={} error={}",
                            anchor, revert_err
                        );
                    }
                }
                return Err(err);
            }
            applied.push(command);
        }

        let in_project = self.is_in_project(anchor);
        if in_project {
            self.changed = true;
        }
        if !in_project || self.log.is_none() {
            release_unreferenced(applied, self.log.as_ref(), &mut self.store, &mut self.bus);
            return Ok(());
        }
        if let Some(log) = self.log.as_mut() {
            let grouped = applied.len() > 1;
            if grouped {
                log.begin_macro(text);
            }
            for command in applied {
                log.record(command, &mut self.store, &mut self.bus);
            }
            if grouped {
                log.end_macro(&mut self.store, &mut self.bus)?;
            }
        }
        Ok(())
    }

    fn would_create_cycle(&self, node: NodeId, candidate_parent: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent);
        while let Some(current) = cursor {
            if current == node || !visited.insert(current) {
                return true;
            }
            cursor = self.store.parent(current);
        }
        false
    }
}
