use crate::cache::TailCache;
use crate::client::ClientHandle;
use crate::models::UserStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Tracks every authenticated user's connection state: a process-local
/// status map, the live socket handle per user (at most one in this
/// process), and a mirror of each status into the shared cache, which is
/// authoritative across processes. Cache writes are advisory.
pub struct PresenceRegistry {
    cache: Arc<TailCache>,
    statuses: Mutex<HashMap<String, UserStatus>>,
    sockets: Mutex<HashMap<String, ClientHandle>>,
}

impl PresenceRegistry {
    pub fn new(cache: Arc<TailCache>) -> Self {
        Self {
            cache,
            statuses: Mutex::new(HashMap::new()),
            sockets: Mutex::new(HashMap::new()),
        }
    }

    /// Register a user's live socket and assert `online`.
    pub async fn connect(&self, user_id: &str, handle: ClientHandle) {
        self.statuses
            .lock()
            .unwrap()
            .insert(user_id.to_string(), UserStatus::Online);
        self.sockets
            .lock()
            .unwrap()
            .insert(user_id.to_string(), handle);
        self.cache.set_status_logged(user_id, "online").await;
    }

    /// Drop the user from both local maps and write `offline` to the cache.
    pub async fn disconnect(&self, user_id: &str) {
        self.statuses.lock().unwrap().remove(user_id);
        self.sockets.lock().unwrap().remove(user_id);
        self.cache.set_status_logged(user_id, "offline").await;
    }

    /// Disconnect only when `connection_id` still owns the registration.
    /// A reconnecting client replaces its old socket; the old reader must
    /// not tear the replacement down when it unwinds.
    pub async fn disconnect_connection(&self, user_id: &str, connection_id: &str) {
        let owns_registration = self
            .sockets
            .lock()
            .unwrap()
            .get(user_id)
            .is_none_or(|handle| handle.id() == connection_id);
        if owns_registration {
            self.disconnect(user_id).await;
        }
    }

    /// Record a validated status locally and mirror it to the cache.
    pub async fn set_status(&self, user_id: &str, status: UserStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(user_id.to_string(), status);
        self.cache
            .set_status_logged(user_id, &status.to_string())
            .await;
    }

    /// True iff the user appears in either local map.
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.statuses.lock().unwrap().contains_key(user_id)
            || self.sockets.lock().unwrap().contains_key(user_id)
    }

    /// Local status; defaults to `online` when the user is unknown.
    pub fn get_status(&self, user_id: &str) -> UserStatus {
        self.local_status(user_id).unwrap_or(UserStatus::Online)
    }

    /// Local status without the default.
    pub fn local_status(&self, user_id: &str) -> Option<UserStatus> {
        self.statuses.lock().unwrap().get(user_id).copied()
    }

    pub fn socket_of(&self, user_id: &str) -> Option<ClientHandle> {
        self.sockets.lock().unwrap().get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PresenceRegistry {
        // Cache at an unroutable port: every mirror write fails and is
        // swallowed, which is exactly the advisory contract.
        PresenceRegistry::new(Arc::new(TailCache::new("redis://127.0.0.1:1/0")))
    }

    #[tokio::test]
    async fn connect_then_disconnect() {
        let presence = registry();
        let (handle, _rx) = ClientHandle::new();

        assert!(!presence.is_connected("u1"));
        presence.connect("u1", handle).await;
        assert!(presence.is_connected("u1"));
        assert_eq!(presence.get_status("u1"), UserStatus::Online);
        assert!(presence.socket_of("u1").is_some());

        presence.disconnect("u1").await;
        assert!(!presence.is_connected("u1"));
        assert!(presence.socket_of("u1").is_none());
        assert!(presence.local_status("u1").is_none());
    }

    #[tokio::test]
    async fn set_status_updates_local_map() {
        let presence = registry();
        let (handle, _rx) = ClientHandle::new();
        presence.connect("u1", handle).await;

        presence.set_status("u1", UserStatus::Dnd).await;
        assert_eq!(presence.get_status("u1"), UserStatus::Dnd);
    }

    #[tokio::test]
    async fn stale_reader_does_not_evict_replacement() {
        let presence = registry();
        let (first, _rx1) = ClientHandle::new();
        let first_id = first.id().to_string();
        presence.connect("u1", first).await;

        // Same user reconnects; the new socket replaces the old one.
        let (second, _rx2) = ClientHandle::new();
        let second_id = second.id().to_string();
        presence.connect("u1", second).await;

        presence.disconnect_connection("u1", &first_id).await;
        assert!(presence.is_connected("u1"), "replacement must survive");
        assert_eq!(presence.socket_of("u1").unwrap().id(), second_id);

        presence.disconnect_connection("u1", &second_id).await;
        assert!(!presence.is_connected("u1"));
    }

    #[test]
    fn unknown_user_defaults_online() {
        let presence = registry();
        assert_eq!(presence.get_status("ghost"), UserStatus::Online);
        assert!(presence.local_status("ghost").is_none());
    }
}
