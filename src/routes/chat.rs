use crate::auth::TokenKeeper;
use crate::cache::TailCache;
use crate::db::Db;
use crate::digestion::DigestionBroker;
use crate::models::{MessageIn, new_mid};
use crate::notify::Notifier;
use crate::rooms::RoomHub;
use futures::{SinkExt, StreamExt};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get};
use rocket_ws as ws;
use std::sync::Arc;

use super::authenticate;

/// Chat ingress: one socket per (client, room). Frames are published to
/// the room's bus queue; delivery back to this socket happens through the
/// room's broadcast task like any other subscriber.
#[get("/message/<room_id>?<token>")]
pub fn message_socket(
    ws: ws::WebSocket,
    room_id: String,
    token: String,
    hub: &State<Arc<RoomHub>>,
    notifier: &State<Arc<Notifier>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> ws::Channel<'static> {
    let hub = hub.inner().clone();
    let notifier = notifier.inner().clone();
    let verified = tokens.verify(&token);

    ws.channel(move |mut stream| {
        Box::pin(async move {
            let user_id = match verified {
                Ok(user_id) => user_id,
                Err(e) => {
                    eprintln!("⚠️ Rejected chat socket for room {room_id}: {e}");
                    let _ = stream
                        .send(ws::Message::Close(Some(ws::frame::CloseFrame {
                            code: ws::frame::CloseCode::Policy,
                            reason: "invalid token".into(),
                        })))
                        .await;
                    return Ok(());
                }
            };

            let (handle, mut outbound) = crate::client::ClientHandle::new();
            let connection_id = handle.id().to_string();
            if let Err(e) = hub.connect(&room_id, handle).await {
                eprintln!("⚠️ Could not join room {room_id}: {e}");
                let _ = stream
                    .send(ws::Message::Close(Some(ws::frame::CloseFrame {
                        code: ws::frame::CloseCode::Away,
                        reason: "room unavailable".into(),
                    })))
                    .await;
                return Ok(());
            }

            loop {
                tokio::select! {
                    queued = outbound.recv() => match queued {
                        Some(frame) => {
                            if stream.send(frame).await.is_err() {
                                break;
                            }
                        }
                        // The hub dropped this client (slow consumer or teardown).
                        None => break,
                    },
                    frame = stream.next() => match frame {
                        Some(Ok(ws::Message::Text(text))) => {
                            let data: MessageIn = match serde_json::from_str(&text) {
                                Ok(data) => data,
                                Err(e) => {
                                    eprintln!("⚠️ Ignoring malformed chat frame from {user_id}: {e}");
                                    continue;
                                }
                            };
                            let mid = new_mid();
                            match hub.publish(&room_id, &data, &user_id, &mid).await {
                                Ok(_) => {
                                    notifier.notify(
                                        &user_id,
                                        serde_json::json!({
                                            "room_id": room_id,
                                            "channel_id": data.channel_id,
                                            "mid": mid,
                                        }),
                                    );
                                }
                                Err(e) => {
                                    eprintln!("⚠️ Publish failed in room {room_id}: {e}");
                                }
                            }
                        }
                        Some(Ok(ws::Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // binary/ping/pong: ignored
                        Some(Err(_)) => break,
                    },
                }
            }

            hub.disconnect(&room_id, &connection_id).await;
            Ok(())
        })
    })
}

/// Recent tail for one channel, newest first. Served from the cache;
/// falls back to the durable store and warms the cache when empty.
#[get("/message/channel/cache?<room_id>&<channel_id>&<token>")]
pub async fn channel_cache(
    room_id: String,
    channel_id: String,
    token: String,
    db: &State<Arc<Db>>,
    cache: &State<Arc<TailCache>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> Result<Json<Vec<serde_json::Value>>, (Status, Json<serde_json::Value>)> {
    authenticate(tokens, &token)?;

    if let Ok(cached) = cache.load_tail(&room_id, &channel_id).await
        && !cached.is_empty()
    {
        let envelopes = cached
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect();
        return Ok(Json(envelopes));
    }

    // Cache miss: read the channel from the store, newest first, and warm
    // the tail so the next reader hits the cache.
    let stored = db
        .fetch_channel_messages(&room_id, &channel_id)
        .unwrap_or_default();

    let mut envelopes: Vec<serde_json::Value> = Vec::with_capacity(stored.len().min(100));
    for message in &stored {
        let username = db
            .get_user(&message.sender_id)
            .map(|u| u.username)
            .unwrap_or_else(|| message.sender_id.clone());
        let record = serde_json::json!({
            "mid": message.id,
            "uid": message.sender_id,
            "username": username,
            "room_id": room_id,
            "channel_id": message.channel_id,
            "message": message.message,
            "timestamp": message.timestamp,
        });
        if let Ok(raw) = serde_json::to_string(&record) {
            // Oldest first, so the newest entry lands at the head.
            if let Err(e) = cache.push_tail(&room_id, &channel_id, &raw).await {
                eprintln!("⚠️ Tail cache: warm failed for room {room_id}: {e}");
            }
        }
        envelopes.push(record);
    }

    envelopes.reverse();
    envelopes.truncate(100);
    Ok(Json(envelopes))
}

/// Remove a message from the write-behind batch and the durable store.
#[delete("/message/<room_id>/<message_id>?<token>")]
pub async fn delete_message(
    room_id: String,
    message_id: String,
    token: String,
    broker: &State<Arc<DigestionBroker>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    authenticate(tokens, &token)?;

    let deleted = broker.delete(&room_id, &message_id).await;
    if deleted {
        Ok(Json(serde_json::json!({"deleted": true})))
    } else {
        Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Message not found"})),
        ))
    }
}
