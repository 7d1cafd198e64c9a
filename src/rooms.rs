use crate::bus::BusGateway;
use crate::cache::TailCache;
use crate::client::ClientHandle;
use crate::db::Db;
use crate::digestion::DigestionBroker;
use crate::error::{RelayError, Result};
use crate::models::{MessageEnvelope, MessageIn};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Diagnostic view of one room's local membership.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub count: usize,
    pub connection_ids: Vec<String>,
}

/// Diagnostic view of one room's consumer task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub done: bool,
    pub cancelled: bool,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// Per-room fan-out. Each room with at least one local subscriber has a
/// bus queue and exactly one consumer task pushing every bus message to
/// all locally-connected sockets and into the digestion broker. Room
/// state is created lazily on the first subscriber and torn down with
/// the last one.
pub struct RoomHub {
    gateway: Arc<BusGateway>,
    cache: Arc<TailCache>,
    broker: Arc<DigestionBroker>,
    db: Arc<Db>,
    rooms: StdMutex<HashMap<String, HashMap<String, ClientHandle>>>,
    tasks: StdMutex<HashMap<String, JoinHandle<()>>>,
    usernames: StdMutex<HashMap<String, String>>,
    // Serializes room setup/teardown; never held across the fan-out path.
    lifecycle: Mutex<()>,
}

impl RoomHub {
    pub fn new(
        gateway: Arc<BusGateway>,
        cache: Arc<TailCache>,
        broker: Arc<DigestionBroker>,
        db: Arc<Db>,
    ) -> Self {
        Self {
            gateway,
            cache,
            broker,
            db,
            rooms: StdMutex::new(HashMap::new()),
            tasks: StdMutex::new(HashMap::new()),
            usernames: StdMutex::new(HashMap::new()),
            lifecycle: Mutex::new(()),
        }
    }

    /// Add a local subscriber. The first subscriber of a room declares the
    /// bus queue and starts the consumer task.
    pub async fn connect(self: &Arc<Self>, room_id: &str, handle: ClientHandle) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let needs_task = !self.rooms.lock().unwrap().contains_key(room_id);
        if needs_task {
            let (_, channel) = self.gateway.queue(room_id).await?;
            // The queue is declared now; a consume failure must release it
            // or it would outlive its only would-be subscriber.
            let consumer = match channel
                .basic_consume(
                    room_id,
                    &format!("relay-{room_id}"),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
            {
                Ok(consumer) => consumer,
                Err(e) => {
                    self.gateway.release(room_id).await;
                    return Err(e.into());
                }
            };

            self.rooms
                .lock()
                .unwrap()
                .insert(room_id.to_string(), HashMap::new());

            println!("🚀 Starting broadcast task for room {room_id}");
            let hub = self.clone();
            let room = room_id.to_string();
            let task = tokio::spawn(async move {
                hub.run_consumer(&room, consumer).await;
            });
            self.tasks.lock().unwrap().insert(room_id.to_string(), task);
        }

        if let Some(room) = self.rooms.lock().unwrap().get_mut(room_id) {
            room.insert(handle.id().to_string(), handle);
        }
        println!("👤 User connected to room {room_id}");
        Ok(())
    }

    /// Remove a local subscriber. When the room empties, the consumer task
    /// is cancelled and awaited, then the bus resources are released and
    /// the map entries erased. Release happens even if the task errored.
    pub async fn disconnect(self: &Arc<Self>, room_id: &str, connection_id: &str) {
        let _guard = self.lifecycle.lock().await;

        let now_empty = {
            let mut rooms = self.rooms.lock().unwrap();
            match rooms.get_mut(room_id) {
                Some(room) => {
                    room.remove(connection_id);
                    if room.is_empty() {
                        rooms.remove(room_id);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if now_empty {
            let task = self.tasks.lock().unwrap().remove(room_id);
            if let Some(task) = task {
                println!("🛑 Stopping broadcast task for room {room_id}");
                task.abort();
                let _ = task.await;
            }
            self.gateway.release(room_id).await;
        }
    }

    /// Publish a client frame into the room: build the authoritative
    /// envelope, hand it to the bus, and record it on the channel tail.
    pub async fn publish(
        &self,
        room_id: &str,
        incoming: &MessageIn,
        sender_id: &str,
        mid: &str,
    ) -> Result<MessageEnvelope> {
        let envelope = MessageEnvelope {
            mid: mid.to_string(),
            uid: sender_id.to_string(),
            username: self.username(sender_id),
            room_id: room_id.to_string(),
            channel_id: incoming.channel_id.clone(),
            message: incoming.message.clone(),
            timestamp: incoming.timestamp.clone(),
        };
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| RelayError::Protocol(format!("unencodable envelope: {e}")))?;

        self.gateway.publish(room_id, &payload).await?;
        self.cache
            .push_tail_logged(room_id, &incoming.channel_id, &envelope)
            .await;
        Ok(envelope)
    }

    /// Sender usernames are denormalized into the envelope at publish time
    /// so the broadcast loop never resolves them again.
    fn username(&self, user_id: &str) -> String {
        if let Some(name) = self.usernames.lock().unwrap().get(user_id) {
            return name.clone();
        }
        let name = self
            .db
            .get_user(user_id)
            .map(|u| u.username)
            .unwrap_or_else(|| user_id.to_string());
        self.usernames
            .lock()
            .unwrap()
            .insert(user_id.to_string(), name.clone());
        name
    }

    /// One room's consumer loop: decode each bus message, fan it out to the
    /// current local members, hand it to the digestion broker, ack. Frame
    /// errors are logged and skipped; a dead consumer stream tears the
    /// room down.
    async fn run_consumer(self: Arc<Self>, room_id: &str, mut consumer: lapin::Consumer) {
        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("⚠️ Broadcast consumer error in room {room_id}: {e}");
                    break;
                }
            };

            match serde_json::from_slice::<MessageEnvelope>(&delivery.data) {
                Ok(envelope) => {
                    self.fan_out(room_id, &envelope);
                    self.broker.add(&envelope.uid, &envelope).await;
                }
                Err(e) => {
                    eprintln!("⚠️ Dropping undecodable bus message in room {room_id}: {e}");
                }
            }

            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                eprintln!("⚠️ Failed to ack bus message in room {room_id}: {e}");
            }
        }

        // The bus stream is gone; tear the room down so clients reconnect.
        self.teardown_after_consumer_exit(room_id).await;
    }

    /// Send the envelope to every local member. Members whose queue is
    /// closed or full are dropped from the room on the spot.
    fn fan_out(&self, room_id: &str, envelope: &MessageEnvelope) {
        let members: Vec<(String, ClientHandle)> = {
            let rooms = self.rooms.lock().unwrap();
            match rooms.get(room_id) {
                Some(room) => room
                    .iter()
                    .map(|(id, handle)| (id.clone(), handle.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        for (connection_id, handle) in members {
            if !handle.send_json(envelope) {
                eprintln!("⚠️ Dropping slow or closed client {connection_id} from room {room_id}");
                if let Some(room) = self.rooms.lock().unwrap().get_mut(room_id) {
                    room.remove(&connection_id);
                }
            }
        }
    }

    async fn teardown_after_consumer_exit(self: &Arc<Self>, room_id: &str) {
        let _guard = self.lifecycle.lock().await;
        let had_task = self.tasks.lock().unwrap().remove(room_id).is_some();
        if !had_task {
            // A disconnect already tore this room down.
            return;
        }
        self.rooms.lock().unwrap().remove(room_id);
        self.gateway.release(room_id).await;
        println!("🛑 Broadcast task for room {room_id} exited; room torn down");
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.lock().unwrap().contains_key(room_id)
    }

    /// Diagnostic snapshot of local room membership.
    pub fn room_snapshot(&self) -> HashMap<String, RoomSnapshot> {
        self.rooms
            .lock()
            .unwrap()
            .iter()
            .map(|(room_id, members)| {
                (
                    room_id.clone(),
                    RoomSnapshot {
                        count: members.len(),
                        connection_ids: members.keys().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    /// Diagnostic snapshot of consumer tasks. Cancelled tasks are removed
    /// from the map synchronously, so live entries are never cancelled.
    pub fn task_snapshot(&self) -> HashMap<String, TaskSnapshot> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|(room_id, task)| {
                (
                    room_id.clone(),
                    TaskSnapshot {
                        done: task.is_finished(),
                        cancelled: false,
                        name: format!("broadcast:{room_id}"),
                        exception: None,
                    },
                )
            })
            .collect()
    }

}
