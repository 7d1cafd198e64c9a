use crate::error::Result;
use lapin::options::{
    BasicPublishOptions, QueueDeclareOptions, QueueDeleteOptions, QueuePurgeOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Declare-time facts about a room's queue, kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

/// Owns the process-wide connection to the message broker and vends one
/// queue + channel pair per active room. The connection is established
/// lazily and re-established on the next `queue()` call after a drop;
/// the mutex makes concurrent callers share a single reconnect attempt.
pub struct BusGateway {
    url: String,
    conn: Mutex<Option<Connection>>,
    rooms: Mutex<HashMap<String, (QueueInfo, Channel)>>,
}

impl BusGateway {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            conn: Mutex::new(None),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    async fn connection(&self) -> Result<tokio::sync::MappedMutexGuard<'_, Connection>> {
        let mut guard = self.conn.lock().await;
        let connected = guard.as_ref().is_some_and(|c| c.status().connected());
        if !connected {
            let conn = Connection::connect(&self.url, ConnectionProperties::default()).await?;
            *guard = Some(conn);
        }
        Ok(tokio::sync::MutexGuard::map(guard, |c| {
            c.as_mut().expect("connection populated above")
        }))
    }

    /// Queue + channel for a room, declaring both on first use. The queue
    /// is named exactly the room id and auto-deletes once unused.
    pub async fn queue(&self, room_id: &str) -> Result<(QueueInfo, Channel)> {
        if let Some((info, channel)) = self.rooms.lock().await.get(room_id) {
            return Ok((info.clone(), channel.clone()));
        }

        let channel = {
            let conn = self.connection().await?;
            conn.create_channel().await?
        };
        let queue = channel
            .queue_declare(
                room_id,
                QueueDeclareOptions {
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        let info = QueueInfo {
            name: queue.name().as_str().to_string(),
            durable: false,
            exclusive: false,
            auto_delete: true,
        };
        println!("📬 Declared queue for room {room_id}");

        self.rooms
            .lock()
            .await
            .insert(room_id.to_string(), (info.clone(), channel.clone()));
        Ok((info, channel))
    }

    /// Publish envelope bytes to a room's queue via the default exchange.
    pub async fn publish(&self, room_id: &str, payload: &[u8]) -> Result<()> {
        let (_, channel) = self.queue(room_id).await?;
        channel
            .basic_publish(
                "",
                room_id,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }

    /// Purge and delete a room's queue and close its channel. Failures are
    /// logged but never surfaced to the caller; the room teardown must
    /// complete regardless.
    pub async fn release(&self, room_id: &str) {
        let entry = self.rooms.lock().await.remove(room_id);
        let Some((_, channel)) = entry else {
            return;
        };

        match channel.queue_purge(room_id, QueuePurgeOptions::default()).await {
            Ok(_) => {}
            Err(e) => eprintln!("⚠️ Failed to purge queue {room_id}: {e}"),
        }
        match channel.queue_delete(room_id, QueueDeleteOptions::default()).await {
            Ok(_) => println!("🗑️ Queue {room_id} deleted"),
            Err(e) => eprintln!("⚠️ Failed to delete queue {room_id}: {e}"),
        }
        if let Err(e) = channel.close(200, "room released").await {
            eprintln!("⚠️ Failed to close channel for room {room_id}: {e}");
        }
    }

    /// Diagnostic snapshot of declared queues.
    pub async fn queue_snapshot(&self) -> HashMap<String, QueueInfo> {
        self.rooms
            .lock()
            .await
            .iter()
            .map(|(room, (info, _))| (room.clone(), info.clone()))
            .collect()
    }

    /// Diagnostic snapshot of open channels.
    pub async fn channel_snapshot(&self) -> HashMap<String, ChannelInfo> {
        self.rooms
            .lock()
            .await
            .iter()
            .map(|(room, (_, channel))| {
                (
                    room.clone(),
                    ChannelInfo {
                        channel_number: channel.id(),
                        is_closed: !channel.status().connected(),
                        connection_name: self.url.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Diagnostic facts about a room's bus channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub channel_number: u16,
    pub is_closed: bool,
    pub connection_name: String,
}
