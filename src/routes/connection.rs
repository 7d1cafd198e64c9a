use crate::auth::TokenKeeper;
use crate::cache::TailCache;
use crate::config::RelayConfig;
use crate::models::{StatusChange, UserStatus};
use crate::presence::PresenceRegistry;
use futures::{SinkExt, StreamExt};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_ws as ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::authenticate;

fn status_update_frame(status: UserStatus) -> ws::Message {
    ws::Message::Text(
        serde_json::json!({"type": "STATUS_UPDATE", "status": status.to_string()}).to_string(),
    )
}

/// Presence ingress: registers the user, then drives the heartbeat.
/// The server pushes a STATUS_UPDATE every heartbeat interval; a client
/// that stays silent past the expiry timeout is closed and marked offline.
#[get("/connection?<token>")]
pub fn connection_socket(
    ws: ws::WebSocket,
    token: String,
    presence: &State<Arc<PresenceRegistry>>,
    config: &State<Arc<RelayConfig>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> ws::Channel<'static> {
    let presence = presence.inner().clone();
    let heartbeat = Duration::from_secs(config.heartbeat_secs);
    let expiry = Duration::from_secs(config.expiry_timeout_secs);
    let verified = tokens.verify(&token);

    ws.channel(move |mut stream| {
        Box::pin(async move {
            let user_id = match verified {
                Ok(user_id) => user_id,
                Err(e) => {
                    eprintln!("⚠️ Rejected presence socket: {e}");
                    let _ = stream
                        .send(ws::Message::Close(Some(ws::frame::CloseFrame {
                            code: ws::frame::CloseCode::Policy,
                            reason: "invalid token".into(),
                        })))
                        .await;
                    return Ok(());
                }
            };

            let (handle, mut notifications) = crate::client::ClientHandle::new();
            let connection_id = handle.id().to_string();
            presence.connect(&user_id, handle).await;

            let established = ws::Message::Text(
                serde_json::json!({"status": "200", "connection": "established"}).to_string(),
            );
            let opening = stream
                .send(status_update_frame(presence.get_status(&user_id)))
                .await;
            if opening.is_err() || stream.send(established).await.is_err() {
                presence.disconnect_connection(&user_id, &connection_id).await;
                return Ok(());
            }

            let mut ticker = tokio::time::interval(heartbeat);
            ticker.tick().await; // consume the immediate first tick
            let mut last_rx = tokio::time::Instant::now();

            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(last_rx + expiry) => {
                        println!("💔 Heartbeat expired for user {user_id}");
                        let _ = stream
                            .send(ws::Message::Close(Some(ws::frame::CloseFrame {
                                code: ws::frame::CloseCode::Normal,
                                reason: "heartbeat expired".into(),
                            })))
                            .await;
                        break;
                    }
                    _ = ticker.tick() => {
                        let frame = status_update_frame(presence.get_status(&user_id));
                        if stream.send(frame).await.is_err() {
                            break;
                        }
                    }
                    queued = notifications.recv() => match queued {
                        Some(frame) => {
                            if stream.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    frame = stream.next() => match frame {
                        Some(Ok(ws::Message::Text(text))) => {
                            last_rx = tokio::time::Instant::now();
                            match serde_json::from_str::<StatusChange>(&text) {
                                Ok(change) => {
                                    if let Some(requested) = change.status {
                                        match requested.parse::<UserStatus>() {
                                            Ok(status) => presence.set_status(&user_id, status).await,
                                            Err(()) => eprintln!(
                                                "⚠️ Ignoring invalid status {requested:?} from {user_id}"
                                            ),
                                        }
                                    }
                                }
                                Err(e) => {
                                    eprintln!("⚠️ Ignoring malformed presence frame from {user_id}: {e}");
                                }
                            }
                        }
                        Some(Ok(ws::Message::Close(_))) | None => break,
                        Some(Ok(_)) => {
                            // Any client traffic counts as liveness.
                            last_rx = tokio::time::Instant::now();
                        }
                        Some(Err(_)) => break,
                    },
                }
            }

            presence.disconnect_connection(&user_id, &connection_id).await;
            Ok(())
        })
    })
}

/// Current status for the requesting user: local registry first, then the
/// shared cache, defaulting to online.
#[get("/status/get?<token>")]
pub async fn status_get(
    token: String,
    presence: &State<Arc<PresenceRegistry>>,
    cache: &State<Arc<TailCache>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let user_id = authenticate(tokens, &token)?;

    let status = match presence.local_status(&user_id) {
        Some(status) => status.to_string(),
        None => match cache.get_status(&user_id).await {
            Ok(Some(status)) => status,
            _ => UserStatus::Online.to_string(),
        },
    };
    Ok(Json(serde_json::json!({"status": status})))
}

/// Set the requesting user's status; invalid values are rejected.
#[post("/status/change?<token>&<new_status>")]
pub async fn status_change(
    token: String,
    new_status: String,
    presence: &State<Arc<PresenceRegistry>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let user_id = authenticate(tokens, &token)?;

    let status: UserStatus = new_status.parse().map_err(|()| {
        (
            Status::BadRequest,
            Json(serde_json::json!({
                "error": format!("Invalid status '{new_status}': expected online|offline|dnd|idle")
            })),
        )
    })?;

    presence.set_status(&user_id, status).await;
    Ok(Json(serde_json::json!({"status": "200"})))
}

/// Every known user status from the shared cache.
#[get("/status/all?<token>")]
pub async fn status_all(
    token: String,
    cache: &State<Arc<TailCache>>,
    tokens: &State<Arc<TokenKeeper>>,
) -> Result<Json<HashMap<String, String>>, (Status, Json<serde_json::Value>)> {
    authenticate(tokens, &token)?;

    let statuses = cache.get_all_statuses().await.unwrap_or_default();
    Ok(Json(statuses))
}
