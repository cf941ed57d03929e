//! Change notification bus.
//!
//! # Responsibility
//! - Deliver before/after event pairs to observers subscribed on a node's
//!   channel.
//! - Re-raise every event through the channels of all ancestors, following
//!   explicit relay links.
//!
//! # Invariants
//! - A relay link exists exactly while the child is attached. Commands add it
//!   right after linking and remove it right after unlinking, so a detached
//!   subtree never reaches its former ancestors.
//! - Observers are held weakly; dropping the last strong reference ends the
//!   subscription.
//! - Delivery is synchronous and happens in subscription order, origin
//!   channel first, then each ancestor up to the root.

use crate::repo::tree_repo::{NodeId, TreeStore};
use log::trace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// One tree notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// Name, comment or caption spec of `node` is about to change.
    DescriptionAboutToChange { node: NodeId },
    /// Name, comment or caption spec of `node` changed.
    DescriptionChanged { node: NodeId },
    /// `child` is about to be inserted into `parent` in front of `before`
    /// (`None` appends).
    ChildAboutToBeAdded {
        parent: NodeId,
        before: Option<NodeId>,
        child: NodeId,
    },
    /// `child` was inserted and is attached now.
    ChildAdded { child: NodeId },
    /// `child` is about to be detached from its parent.
    ChildAboutToBeRemoved { child: NodeId },
    /// `child` was detached from `parent`; `before` is its former next
    /// sibling.
    ChildRemoved {
        parent: NodeId,
        before: Option<NodeId>,
        child: NodeId,
    },
    /// Hidden flag of `node` is about to flip.
    HiddenAboutToChange { node: NodeId },
    /// Hidden flag of `node` flipped.
    HiddenChanged { node: NodeId },
    /// Human-readable status message, e.g. about an automatic rename.
    StatusInfo { node: NodeId, message: String },
    /// A consumer asked views to start inline editing of `node`'s name.
    RenameRequested { node: NodeId },
}

impl TreeEvent {
    /// Short stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DescriptionAboutToChange { .. } => "description_about_to_change",
            Self::DescriptionChanged { .. } => "description_changed",
            Self::ChildAboutToBeAdded { .. } => "child_about_to_be_added",
            Self::ChildAdded { .. } => "child_added",
            Self::ChildAboutToBeRemoved { .. } => "child_about_to_be_removed",
            Self::ChildRemoved { .. } => "child_removed",
            Self::HiddenAboutToChange { .. } => "hidden_about_to_change",
            Self::HiddenChanged { .. } => "hidden_changed",
            Self::StatusInfo { .. } => "status_info",
            Self::RenameRequested { .. } => "rename_requested",
        }
    }
}

/// Receiver of tree notifications.
///
/// `store` reflects the tree at emission time: before-events see the state
/// prior to the mutation, after-events the state after it.
pub trait TreeObserver {
    fn on_tree_event(&self, store: &TreeStore, event: &TreeEvent);
}

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    observer: Weak<dyn TreeObserver>,
}

/// Per-tree notification channels and relay links.
#[derive(Default)]
pub struct NotificationBus {
    relays: HashMap<NodeId, NodeId>,
    subscriptions: HashMap<NodeId, Vec<Subscription>>,
    next_id: u64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `observer` to the channel of `channel`.
    pub fn subscribe(&mut self, channel: NodeId, observer: Rc<dyn TreeObserver>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions
            .entry(channel)
            .or_default()
            .push(Subscription {
                id,
                observer: Rc::downgrade(&observer),
            });
        id
    }

    /// Ends one subscription. Returns `false` when it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subscriptions in self.subscriptions.values_mut() {
            if let Some(position) = subscriptions.iter().position(|sub| sub.id == id) {
                subscriptions.remove(position);
                return true;
            }
        }
        false
    }

    /// Relays everything raised on `child`'s channel to `parent`'s channel.
    pub(crate) fn connect_child(&mut self, parent: NodeId, child: NodeId) {
        self.relays.insert(child, parent);
    }

    /// Stops relaying `child`'s channel.
    pub(crate) fn disconnect_child(&mut self, child: NodeId) {
        self.relays.remove(&child);
    }

    /// Channel that `child` currently relays to.
    pub fn relay_target(&self, child: NodeId) -> Option<NodeId> {
        self.relays.get(&child).copied()
    }

    /// Drops channels and relays of destroyed nodes.
    pub(crate) fn forget(&mut self, nodes: &[NodeId]) {
        for node in nodes {
            self.relays.remove(node);
            self.subscriptions.remove(node);
        }
    }

    /// Raises `event` on `origin` and on every channel it relays to.
    pub(crate) fn emit(&mut self, store: &TreeStore, origin: NodeId, event: &TreeEvent) {
        trace!(
            "event=tree_notify module=notify origin={} kind={}",
            origin,
            event.name()
        );
        let mut channel = Some(origin);
        let mut hops = 0usize;
        while let Some(current) = channel {
            for observer in self.live_observers(current) {
                observer.on_tree_event(store, event);
            }
            channel = self.relays.get(&current).copied();
            hops += 1;
            if hops > self.relays.len() + 1 {
                // Relay links mirror the acyclic ownership tree.
                break;
            }
        }
    }

    fn live_observers(&mut self, channel: NodeId) -> Vec<Rc<dyn TreeObserver>> {
        let Some(subscriptions) = self.subscriptions.get_mut(&channel) else {
            return Vec::new();
        };
        subscriptions.retain(|sub| sub.observer.strong_count() > 0);
        subscriptions
            .iter()
            .filter_map(|sub| sub.observer.upgrade())
            .collect()
    }
}

/// Observer that records every event it receives.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: RefCell<Vec<TreeEvent>>,
}

impl EventRecorder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Copy of all recorded events, oldest first.
    pub fn events(&self) -> Vec<TreeEvent> {
        self.events.borrow().clone()
    }

    /// Returns and clears the recorded events.
    pub fn take(&self) -> Vec<TreeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl TreeObserver for EventRecorder {
    fn on_tree_event(&self, _store: &TreeStore, event: &TreeEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
