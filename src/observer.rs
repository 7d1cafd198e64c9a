use crate::bus::BusGateway;
use crate::rooms::RoomHub;
use std::sync::Arc;

/// Diagnostic snapshotter for the broadcaster internals: local room
/// membership, declared queues, open bus channels and consumer tasks.
/// An md5 hash per section is retained so a subscriber can tell which
/// sections changed between reports.
pub struct Observer {
    hub: Arc<RoomHub>,
    gateway: Arc<BusGateway>,
    rooms_hash: String,
    queues_hash: String,
    channels_hash: String,
    tasks_hash: String,
}

pub fn section_hash(section: &serde_json::Value) -> String {
    // serde_json maps are ordered, so the serialization is canonical.
    format!("{:x}", md5::compute(section.to_string().as_bytes()))
}

impl Observer {
    pub fn new(hub: Arc<RoomHub>, gateway: Arc<BusGateway>) -> Self {
        Self {
            hub,
            gateway,
            rooms_hash: String::new(),
            queues_hash: String::new(),
            channels_hash: String::new(),
            tasks_hash: String::new(),
        }
    }

    /// Build the full snapshot, updating the per-section hashes. The
    /// report lists which sections changed since the previous one.
    pub async fn report(&mut self) -> serde_json::Value {
        let rooms = serde_json::to_value(self.hub.room_snapshot()).unwrap_or_default();
        let queues = serde_json::to_value(self.gateway.queue_snapshot().await).unwrap_or_default();
        let channels =
            serde_json::to_value(self.gateway.channel_snapshot().await).unwrap_or_default();
        let tasks = serde_json::to_value(self.hub.task_snapshot()).unwrap_or_default();

        let mut changed = Vec::new();
        for (name, section, hash) in [
            ("rooms", &rooms, &mut self.rooms_hash),
            ("bus_queues", &queues, &mut self.queues_hash),
            ("bus_channels", &channels, &mut self.channels_hash),
            ("broadcast_tasks", &tasks, &mut self.tasks_hash),
        ] {
            let new_hash = section_hash(section);
            if new_hash != *hash {
                changed.push(name);
                *hash = new_hash;
            }
        }

        serde_json::json!({
            "rooms": rooms,
            "bus_queues": queues,
            "bus_channels": channels,
            "broadcast_tasks": tasks,
            "changed": changed,
        })
    }
}
