//! Connection-to-user bindings.
//!
//! Each user id names a room; a room holds every live connection that user
//! authenticated with. Bindings live only in this process.

use dashmap::DashMap;
use notify_core::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing;

use crate::handle::{ConnectionHandle, ConnectionId};

/// Swappable so rooms can move to shared storage when several delivery
/// processes run side by side.
pub trait ConnectionRegistry: Send + Sync {
    fn bind(&self, handle: ConnectionHandle);

    fn unbind(&self, id: ConnectionId) -> Option<ConnectionHandle>;

    fn connections_for(&self, user_id: UserId) -> Vec<ConnectionHandle>;

    fn connection_count(&self) -> usize;
}

/// Concurrent map of rooms keyed by user id.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
    owners: DashMap<ConnectionId, UserId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl ConnectionRegistry for RoomRegistry {
    fn bind(&self, handle: ConnectionHandle) {
        let (id, user_id) = (handle.id, handle.user_id);
        self.owners.insert(id, user_id);
        self.rooms.entry(user_id).or_default().insert(id, handle);

        tracing::debug!(conn_id = %id, user_id, "Connection joined room");
    }

    fn unbind(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let (_, user_id) = self.owners.remove(&id)?;

        let removed = self
            .rooms
            .get_mut(&user_id)
            .and_then(|mut room| room.remove(&id));
        self.rooms.remove_if(&user_id, |_, room| room.is_empty());

        tracing::debug!(conn_id = %id, user_id, "Connection left room");
        removed
    }

    fn connections_for(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        self.rooms
            .get(&user_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    fn connection_count(&self) -> usize {
        self.owners.len()
    }
}

/// Keeps a connection bound for as long as it is alive.
///
/// Dropping the guard removes the binding, so a socket task that ends for any
/// reason (client close, network error, shutdown) leaves no room membership
/// behind.
#[must_use = "the connection is unbound as soon as the binding is dropped"]
pub struct Binding {
    registry: Arc<dyn ConnectionRegistry>,
    id: ConnectionId,
    user_id: UserId,
}

impl Binding {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, handle: ConnectionHandle) -> Self {
        let (id, user_id) = (handle.id, handle.user_id);
        registry.bind(handle);
        Self {
            registry,
            id,
            user_id,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.registry.unbind(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_connections_per_user() {
        let registry = RoomRegistry::new();
        let (tab_one, _rx1) = ConnectionHandle::new(7, 8);
        let (tab_two, _rx2) = ConnectionHandle::new(7, 8);
        let (other, _rx3) = ConnectionHandle::new(9, 8);

        registry.bind(tab_one.clone());
        registry.bind(tab_two.clone());
        registry.bind(other);

        assert_eq!(registry.connections_for(7).len(), 2);
        assert_eq!(registry.connections_for(9).len(), 1);
        assert!(registry.connections_for(42).is_empty());
        assert_eq!(registry.connection_count(), 3);
        assert_eq!(registry.room_count(), 2);

        assert!(registry.unbind(tab_one.id).is_some());
        let remaining = registry.connections_for(7);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, tab_two.id);
    }

    #[test]
    fn test_empty_room_is_removed() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = ConnectionHandle::new(7, 8);
        registry.bind(handle.clone());

        assert!(registry.unbind(handle.id).is_some());
        assert!(registry.unbind(handle.id).is_none());
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_binding_unbinds_on_drop() {
        let registry: Arc<RoomRegistry> = Arc::new(RoomRegistry::new());
        let (handle, _rx) = ConnectionHandle::new(7, 8);

        let binding = Binding::new(registry.clone(), handle);
        assert_eq!(binding.user_id(), 7);
        assert_eq!(registry.connections_for(7).len(), 1);

        drop(binding);
        assert!(registry.connections_for(7).is_empty());
        assert_eq!(registry.connection_count(), 0);
    }
}
