//! Session-scoped binding of controlling peers to the entity they view.
//!
//! Replaces a process-wide "active first-person viewer": the binding is owned
//! by a session, changed only through [`ViewBinding::rebind`], and interested
//! parties subscribe to an observer list.

use crate::{EntityId, PeerId};
use std::collections::BTreeMap;

/// Notification emitted when a peer's bound entity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewChange {
    /// Peer whose view changed.
    pub peer: PeerId,
    /// Previously bound entity, if any.
    pub previous: Option<EntityId>,
    /// Newly bound entity, `None` when unbound.
    pub current: Option<EntityId>,
}

type Observer = Box<dyn FnMut(&ViewChange) + Send>;

/// Mapping from controlling peer to viewed entity.
#[derive(Default)]
pub struct ViewBinding {
    bindings: BTreeMap<PeerId, EntityId>,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for ViewBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewBinding")
            .field("bindings", &self.bindings)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ViewBinding {
    /// Create an empty binding table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer called on every effective change.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&ViewChange) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Entity currently viewed by `peer`.
    pub fn entity_for(&self, peer: PeerId) -> Option<EntityId> {
        self.bindings.get(&peer).copied()
    }

    /// Every current binding in peer order.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, EntityId)> + '_ {
        self.bindings.iter().map(|(peer, entity)| (*peer, *entity))
    }

    /// Peer controlling `entity`, if any.
    pub fn peer_for(&self, entity: EntityId) -> Option<PeerId> {
        self.iter().find(|(_, e)| *e == entity).map(|(peer, _)| peer)
    }

    /// Bind `peer` to `entity`, returning the previous binding.
    ///
    /// Rebinding to the same entity is a no-op and notifies nobody.
    pub fn rebind(&mut self, peer: PeerId, entity: EntityId) -> Option<EntityId> {
        let previous = self.bindings.insert(peer, entity);
        if previous != Some(entity) {
            self.notify(ViewChange {
                peer,
                previous,
                current: Some(entity),
            });
        }
        previous
    }

    /// Remove the binding for `peer`.
    pub fn unbind(&mut self, peer: PeerId) -> Option<EntityId> {
        let previous = self.bindings.remove(&peer);
        if previous.is_some() {
            self.notify(ViewChange {
                peer,
                previous,
                current: None,
            });
        }
        previous
    }

    fn notify(&mut self, change: ViewChange) {
        for observer in &mut self.observers {
            observer(&change);
        }
    }
}
