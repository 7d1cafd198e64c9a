// Route module decomposition — each endpoint area in its own file.
// WebSocket ingress in chat/connection, diagnostics in observe.

mod chat;
mod connection;
mod observe;

pub use chat::{channel_cache, delete_message, message_socket};
pub use connection::{connection_socket, status_all, status_change, status_get};
pub use observe::logs_socket;

use crate::auth::TokenKeeper;
use rocket::http::Status;
use rocket::serde::json::Json;

/// Verify a query-string bearer token, mapping failure onto the 401 body
/// every HTTP surface route uses.
pub(crate) fn authenticate(
    tokens: &TokenKeeper,
    token: &str,
) -> Result<String, (Status, Json<serde_json::Value>)> {
    tokens.verify(token).map_err(|e| {
        (
            Status::Unauthorized,
            Json(serde_json::json!({"error": e.to_string()})),
        )
    })
}

// --- Catchers ---

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}

#[rocket::catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Unauthorized"}))
}
