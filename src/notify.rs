use crate::presence::PresenceRegistry;
use std::sync::Arc;

/// Best-effort point-to-point delivery to a user's live connection.
/// Users without a local socket are silently skipped (at-most-once).
pub struct Notifier {
    presence: Arc<PresenceRegistry>,
}

impl Notifier {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// Push `{sender, message}` to the user's connection socket if one is
    /// registered. Returns whether a frame was queued.
    pub fn notify(&self, user_id: &str, payload: serde_json::Value) -> bool {
        let Some(handle) = self.presence.socket_of(user_id) else {
            return false;
        };
        handle.send_json(&serde_json::json!({
            "sender": user_id,
            "message": payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TailCache;
    use crate::client::ClientHandle;

    fn setup() -> (Arc<PresenceRegistry>, Notifier) {
        let presence = Arc::new(PresenceRegistry::new(Arc::new(TailCache::new(
            "redis://127.0.0.1:1/0",
        ))));
        let notifier = Notifier::new(presence.clone());
        (presence, notifier)
    }

    #[tokio::test]
    async fn delivers_to_connected_user() {
        let (presence, notifier) = setup();
        let (handle, mut rx) = ClientHandle::new();
        presence.connect("u1", handle).await;

        assert!(notifier.notify("u1", serde_json::json!({"mid": "abcd1234"})));
        let frame = rx.recv().await.unwrap();
        let text = match frame {
            rocket_ws::Message::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["sender"], "u1");
        assert_eq!(value["message"]["mid"], "abcd1234");
    }

    #[test]
    fn drops_silently_for_offline_user() {
        let (_presence, notifier) = setup();
        assert!(!notifier.notify("ghost", serde_json::json!({})));
    }
}
