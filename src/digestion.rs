use crate::db::{Db, MessageRow};
use crate::models::MessageEnvelope;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Client timestamps arrive as `YYYY-MM-DD HH:MM:SS AM/PM`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

/// A batched message waiting to be persisted.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub room_id: String,
    pub row: MessageRow,
}

/// Write-behind batcher between the live broadcast path and the durable
/// store. Messages accumulate in memory and are flushed as one transaction
/// per room when the batch fills or the interval timer fires. A failed
/// flush keeps the affected rows for the next attempt (at-least-once);
/// inserts are keyed by mid so retries never double-persist.
pub struct DigestionBroker {
    db: Arc<Db>,
    batch_size: usize,
    flush_interval: Duration,
    batch: Mutex<Vec<PendingMessage>>,
    flush_in_flight: AtomicBool,
}

/// Parse a client timestamp; None when it doesn't match the wire format.
pub fn parse_timestamp(timestamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()
}

impl DigestionBroker {
    pub fn new(db: Arc<Db>, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            db,
            batch_size,
            flush_interval,
            batch: Mutex::new(Vec::new()),
            flush_in_flight: AtomicBool::new(false),
        }
    }

    /// Append a normalized record to the batch. When the batch reaches
    /// `batch_size` and no flush is already in flight, an immediate flush
    /// is scheduled; a second fill during that flush does not schedule
    /// another.
    pub async fn add(self: &Arc<Self>, user_id: &str, envelope: &MessageEnvelope) {
        // Unparsable timestamps get server time; the message is never dropped.
        let timestamp = parse_timestamp(&envelope.timestamp)
            .unwrap_or_else(|| chrono::Utc::now().naive_utc());

        let pending = PendingMessage {
            room_id: envelope.room_id.clone(),
            row: MessageRow {
                id: envelope.mid.clone(),
                channel_id: envelope.channel_id.clone(),
                sender_id: user_id.to_string(),
                message: envelope.message.clone(),
                timestamp,
            },
        };

        let should_flush = {
            let mut batch = self.batch.lock().await;
            batch.push(pending);
            batch.len() >= self.batch_size
        };

        if should_flush && !self.flush_in_flight.swap(true, Ordering::SeqCst) {
            let broker = self.clone();
            tokio::spawn(async move {
                broker.flush().await;
                broker.flush_in_flight.store(false, Ordering::SeqCst);
            });
        }
    }

    /// Drain the batch to the durable store, one transaction per room.
    /// Rooms whose transaction fails keep their rows for the next attempt.
    /// Returns the number of messages persisted.
    pub async fn flush(&self) -> usize {
        let mut batch = self.batch.lock().await;
        if batch.is_empty() {
            return 0;
        }

        let mut room_order: Vec<String> = Vec::new();
        for msg in batch.iter() {
            if !room_order.contains(&msg.room_id) {
                room_order.push(msg.room_id.clone());
            }
        }

        let mut flushed_rooms: Vec<String> = Vec::new();
        let mut flushed = 0usize;
        for room_id in room_order {
            let rows: Vec<MessageRow> = batch
                .iter()
                .filter(|m| m.room_id == room_id)
                .map(|m| m.row.clone())
                .collect();
            let result = self
                .db
                .create_room_tables(&room_id)
                .and_then(|_| self.db.append_messages(&room_id, &rows));
            match result {
                Ok(()) => {
                    flushed += rows.len();
                    flushed_rooms.push(room_id);
                }
                Err(e) => {
                    eprintln!("⚠️ Digestion: flush failed for room {room_id}, retaining batch: {e}");
                }
            }
        }

        batch.retain(|m| !flushed_rooms.contains(&m.room_id));
        if flushed > 0 {
            println!("💾 Digestion: flushed {flushed} messages");
        }
        flushed
    }

    /// Remove a message from the in-memory batch if still pending, and
    /// delete it from the room's table.
    pub async fn delete(&self, room_id: &str, message_id: &str) -> bool {
        let in_batch = {
            let mut batch = self.batch.lock().await;
            let before = batch.len();
            batch.retain(|m| m.row.id != message_id);
            batch.len() < before
        };
        let in_db = match self.db.delete_message(room_id, message_id) {
            Ok(n) => n > 0,
            Err(e) => {
                eprintln!("⚠️ Digestion: delete failed for {message_id}: {e}");
                false
            }
        };
        in_batch || in_db
    }

    pub async fn pending(&self) -> usize {
        self.batch.lock().await.len()
    }

    /// Background loop that flushes every `flush_interval` for the lifetime
    /// of the process.
    pub fn spawn_flush_loop(self: &Arc<Self>) {
        let broker = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(broker.flush_interval).await;
                broker.flush().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_broker(batch_size: usize) -> (Arc<DigestionBroker>, String) {
        let path = format!(
            "/tmp/relay_digest_test_{}.db",
            uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
        );
        let db = Arc::new(Db::new(&path));
        (
            Arc::new(DigestionBroker::new(
                db,
                batch_size,
                Duration::from_secs(5),
            )),
            path,
        )
    }

    fn envelope(room_id: &str, mid: &str) -> MessageEnvelope {
        MessageEnvelope {
            mid: mid.to_string(),
            uid: "u1".to_string(),
            username: "nanook".to_string(),
            room_id: room_id.to_string(),
            channel_id: "c1".to_string(),
            message: "hello".to_string(),
            timestamp: "2024-01-01 10:00:00 AM".to_string(),
        }
    }

    #[test]
    fn timestamp_parsing() {
        let parsed = parse_timestamp("2024-01-01 10:30:05 PM").unwrap();
        assert_eq!(parsed.format("%H:%M:%S").to_string(), "22:30:05");
        assert!(parse_timestamp("2024-01-01T10:30:05Z").is_none());
        assert!(parse_timestamp("garbage").is_none());
    }

    #[tokio::test]
    async fn bad_timestamp_still_records_message() {
        let (broker, path) = temp_broker(100);
        let room = uuid::Uuid::new_v4().to_string();
        let mut bad = envelope(&room, "aaaa1111");
        bad.timestamp = "not a timestamp".to_string();
        broker.add("u1", &bad).await;
        assert_eq!(broker.pending().await, 1);
        assert_eq!(broker.flush().await, 1);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn flush_persists_and_empties_batch() {
        let (broker, path) = temp_broker(100);
        let room = uuid::Uuid::new_v4().to_string();
        for i in 0..3 {
            broker.add("u1", &envelope(&room, &format!("mid0000{i}"))).await;
        }
        assert_eq!(broker.pending().await, 3);
        assert_eq!(broker.flush().await, 3);
        assert_eq!(broker.pending().await, 0);
        // Flushing an empty batch is a no-op
        assert_eq!(broker.flush().await, 0);

        let stored = broker.db.fetch_channel_messages(&room, "c1").unwrap();
        assert_eq!(stored.len(), 3);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_boundary_schedules_immediate_flush() {
        let (broker, path) = temp_broker(10);
        let room = uuid::Uuid::new_v4().to_string();
        for i in 0..10 {
            broker.add("u1", &envelope(&room, &format!("mid000{i:02}"))).await;
        }
        // The tenth add spawns a flush; wait for it to land.
        let mut persisted = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            persisted = broker
                .db
                .fetch_channel_messages(&room, "c1")
                .map(|rows| rows.len())
                .unwrap_or(0);
            if persisted == 10 {
                break;
            }
        }
        assert_eq!(persisted, 10);
        assert_eq!(broker.pending().await, 0);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn delete_removes_from_batch_and_store() {
        let (broker, path) = temp_broker(100);
        let room = uuid::Uuid::new_v4().to_string();
        broker.add("u1", &envelope(&room, "keep0001")).await;
        broker.add("u1", &envelope(&room, "drop0001")).await;
        assert!(broker.delete(&room, "drop0001").await);
        assert_eq!(broker.pending().await, 1);

        broker.flush().await;
        assert!(broker.delete(&room, "keep0001").await);
        let stored = broker.db.fetch_channel_messages(&room, "c1").unwrap();
        assert!(stored.is_empty());
        std::fs::remove_file(&path).ok();
    }
}
