use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::common::{ServerEvent, UserId};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound side of one realtime connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for the connection; false once the socket is gone.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[derive(Default)]
struct Registry {
    by_user: HashMap<UserId, ConnectionHandle>,
    /// Only live handles appear here, so it mirrors `by_user`.
    by_connection: HashMap<ConnectionId, UserId>,
}

impl Registry {
    fn broadcast(&self, event: &ServerEvent, except: Option<ConnectionId>) {
        for handle in self.by_user.values() {
            if Some(handle.id()) != except && !handle.push(event.clone()) {
                log::debug!("Presence update dropped for closed connection {}", handle.id());
            }
        }
    }
}

/// Which users currently hold a live realtime connection.
///
/// One connection per user: the last `register` wins, and `unregister`
/// only removes a handle that is still the current one for its user.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<Registry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle` and announce it online to everyone else.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.by_connection.insert(handle.id(), user_id.clone()) {
            if previous != user_id {
                inner.by_user.remove(&previous);
                inner.broadcast(&ServerEvent::status(previous, false), Some(handle.id()));
            }
        }

        if let Some(replaced) = inner.by_user.insert(user_id.clone(), handle.clone()) {
            if replaced != handle {
                inner.by_connection.remove(&replaced.id());
                log::info!(
                    "User {user_id} moved from connection {} to {}",
                    replaced.id(),
                    handle.id()
                );
            }
        }

        inner.broadcast(&ServerEvent::status(user_id, true), Some(handle.id()));
    }

    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.inner.lock().by_user.get(user_id).cloned()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.inner.lock().by_user.contains_key(user_id)
    }

    /// Drop `handle` if it is still live; returns the user that went offline.
    pub fn unregister(&self, handle: &ConnectionHandle) -> Option<UserId> {
        let mut inner = self.inner.lock();
        let user_id = inner.by_connection.remove(&handle.id())?;
        inner.by_user.remove(&user_id);
        inner.broadcast(&ServerEvent::status(user_id.clone(), false), None);
        Some(user_id)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.inner.lock().by_user.keys().cloned().collect()
    }

    pub fn online_count(&self) -> usize {
        self.inner.lock().by_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn last_register_wins_and_stale_unregister_is_ignored() {
        let registry = PresenceRegistry::new();
        let user = UserId::new("u");
        let (h1, _rx1) = connection();
        let (h2, _rx2) = connection();

        registry.register(user.clone(), h1.clone());
        registry.register(user.clone(), h2.clone());
        assert_eq!(registry.lookup(&user), Some(h2.clone()));

        assert_eq!(registry.unregister(&h1), None);
        assert_eq!(registry.lookup(&user), Some(h2.clone()));

        assert_eq!(registry.unregister(&h2), Some(user.clone()));
        assert!(registry.lookup(&user).is_none());
        assert_eq!(registry.online_count(), 0);
    }

    #[test]
    fn status_changes_reach_other_connections_only() {
        let registry = PresenceRegistry::new();
        let (alice, mut alice_rx) = connection();
        let (bob, mut bob_rx) = connection();

        registry.register(UserId::new("alice"), alice.clone());
        registry.register(UserId::new("bob"), bob.clone());

        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::status(UserId::new("bob"), true)]
        );
        assert!(drain(&mut bob_rx).is_empty());

        registry.unregister(&bob);
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::status(UserId::new("bob"), false)]
        );
    }

    #[test]
    fn stale_unregister_does_not_announce_offline() {
        let registry = PresenceRegistry::new();
        let (watcher, mut watcher_rx) = connection();
        let (h1, _rx1) = connection();
        let (h2, _rx2) = connection();
        registry.register(UserId::new("watcher"), watcher);
        registry.register(UserId::new("u"), h1.clone());
        registry.register(UserId::new("u"), h2);
        drain(&mut watcher_rx);

        registry.unregister(&h1);
        assert!(drain(&mut watcher_rx).is_empty());
    }

    #[test]
    fn rebinding_a_connection_releases_the_previous_user() {
        let registry = PresenceRegistry::new();
        let (handle, _rx) = connection();

        registry.register(UserId::new("first"), handle.clone());
        registry.register(UserId::new("second"), handle.clone());

        assert!(!registry.is_online(&UserId::new("first")));
        assert_eq!(registry.lookup(&UserId::new("second")), Some(handle.clone()));
        assert_eq!(registry.unregister(&handle), Some(UserId::new("second")));
        assert!(registry.online_users().is_empty());
    }

    #[test]
    fn rebinding_announces_the_previous_user_offline() {
        let registry = PresenceRegistry::new();
        let (watcher, mut watcher_rx) = connection();
        let (handle, mut handle_rx) = connection();
        registry.register(UserId::new("watcher"), watcher);
        registry.register(UserId::new("first"), handle.clone());
        drain(&mut watcher_rx);

        registry.register(UserId::new("second"), handle);

        assert_eq!(
            drain(&mut watcher_rx),
            vec![
                ServerEvent::status(UserId::new("first"), false),
                ServerEvent::status(UserId::new("second"), true),
            ]
        );
        assert!(drain(&mut handle_rx).is_empty());
    }
}
