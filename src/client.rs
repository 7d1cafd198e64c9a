use rocket_ws::Message;
use serde::Serialize;
use tokio::sync::mpsc;

/// Outbound frames queued per client before the socket writer drains them.
/// A full queue means the client is too slow to keep; it gets dropped.
const CLIENT_QUEUE_CAPACITY: usize = 64;

/// Send-side handle for one WebSocket client. Identity is the stable
/// `ConnectionId`, never the socket object, so handles can be keyed across
/// subsystem boundaries.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: String,
    tx: mpsc::Sender<Message>,
}

impl ClientHandle {
    /// New handle plus the receive side the socket task drains.
    pub fn new() -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        (
            Self {
                id: uuid::Uuid::new_v4().to_string(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a JSON text frame. Returns false when the client is gone or
    /// its queue is full (slow consumer) — callers treat both as disconnect.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.tx.try_send(Message::Text(text)).is_ok(),
            Err(_) => false,
        }
    }
}
